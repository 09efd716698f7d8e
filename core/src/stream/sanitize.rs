//! Terminal stream sanitizing
//!
//! Removes escape sequences and control bytes from raw PTY output, and turns
//! free-form provider text into a single executable command line.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// OSC sequences, terminated by BEL or ST. Checked before CSI so the
    /// payload of an unterminated title never leaks.
    static ref OSC: Regex = Regex::new(r"\x1B\][^\x07\x1B]*(?:\x07|\x1B\\)").expect("valid regex");
    /// CSI sequences, charset designations (`ESC ( B`) and two-byte escapes
    /// such as keypad modes (`ESC =`).
    static ref CSI: Regex =
        Regex::new(r"\x1B(?:[()#][0-9A-Za-z]|[@-Z\\-_=>78]|\[[0-?]*[ -/]*[@-~])").expect("valid regex");
    static ref CSI_FULL: Regex = Regex::new(r"^\[[0-?]*[ -/]*[@-~]").expect("valid regex");
    /// C0 controls except `\t` and `\n`.
    static ref CONTROL: Regex = Regex::new(r"[\x00-\x08\x0B-\x1F\x7F]").expect("valid regex");

    static ref CODE_BLOCK: Regex = Regex::new(r"```(?:\w+)?[ \t]*\n([\s\S]*?)```").expect("valid regex");
    static ref PROMPT_MARKER: Regex = Regex::new(r"^[$#>]\s+").expect("valid regex");
    static ref LABEL_PREFIX: Regex =
        Regex::new(r"(?i)^(?:command|run|execute|try|use):\s*").expect("valid regex");
    static ref PROSE_LINE: Regex = Regex::new(
        r"(?i)^(?:Note|This|The|It|You|Or|And|But|If|Then|Also|First|Next|Finally|Make sure|Remember)\b"
    )
    .expect("valid regex");
    static ref COMMAND_START: Regex = Regex::new(r"^[a-zA-Z0-9_./~$(-]").expect("valid regex");
}

/// Strip terminal control sequences from raw session output.
///
/// `\r\n` is folded to `\n`; any other carriage return, escape byte or C0
/// control (tab excepted) is dropped. Never fails.
pub fn strip_ansi(text: &str) -> String {
    let text = OSC.replace_all(text, "");
    let text = CSI.replace_all(&text, "");
    let text = text.replace("\r\n", "\n");
    CONTROL.replace_all(&text, "").into_owned()
}

/// Sanitize raw bytes from the channel. Invalid UTF-8 is replaced, not rejected.
pub fn strip_ansi_bytes(bytes: &[u8]) -> String {
    strip_ansi(&String::from_utf8_lossy(bytes))
}

/// Longest trailing fragment held back while waiting for the rest of an
/// escape sequence.
const MAX_HELD_ESCAPE: usize = 256;

/// Incremental decoder for a chunked terminal stream.
///
/// Carries split UTF-8 sequences, unterminated escape sequences and a
/// trailing `\r` over to the next chunk so the sanitized text only ever
/// grows by appending.
#[derive(Debug, Default)]
pub struct StreamDecoder {
    pending_bytes: Vec<u8>,
    pending_text: String,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a chunk. Returns the raw text and its sanitized form.
    pub fn push(&mut self, bytes: &[u8]) -> (String, String) {
        let mut buf = std::mem::take(&mut self.pending_bytes);
        buf.extend_from_slice(bytes);

        let raw = match std::str::from_utf8(&buf) {
            Ok(text) => text.to_string(),
            Err(e) if e.error_len().is_none() => {
                let valid = e.valid_up_to();
                self.pending_bytes = buf[valid..].to_vec();
                String::from_utf8_lossy(&buf[..valid]).into_owned()
            }
            Err(_) => String::from_utf8_lossy(&buf).into_owned(),
        };

        let mut text = std::mem::take(&mut self.pending_text);
        text.push_str(&raw);
        let hold_from = incomplete_tail(&text);
        self.pending_text = text.split_off(hold_from);

        let clean = strip_ansi(&text);
        (raw, clean)
    }

    /// Flush anything still held back.
    pub fn finish(&mut self) -> String {
        let mut text = std::mem::take(&mut self.pending_text);
        if !self.pending_bytes.is_empty() {
            text.push_str(&String::from_utf8_lossy(&std::mem::take(&mut self.pending_bytes)));
        }
        strip_ansi(&text)
    }
}

/// Byte index from which `text` may still change meaning once more input
/// arrives, or `text.len()` when all of it is final.
fn incomplete_tail(text: &str) -> usize {
    if let Some(esc) = text.rfind('\x1b') {
        let seq = &text[esc..];
        if seq.len() <= MAX_HELD_ESCAPE && !escape_is_complete(seq) {
            return esc;
        }
    }
    if text.ends_with('\r') {
        return text.len() - 1;
    }
    text.len()
}

/// `seq` starts with ESC and contains no further ESC.
fn escape_is_complete(seq: &str) -> bool {
    let rest = &seq[1..];
    if let Some(osc) = rest.strip_prefix(']') {
        osc.contains('\x07')
    } else if rest.starts_with('[') {
        CSI_FULL.is_match(rest)
    } else if rest.starts_with(['(', ')', '#']) {
        rest.len() > 1
    } else {
        !rest.is_empty()
    }
}

/// Last non-empty line of sanitized text, or `""`.
pub fn last_non_empty_line(text: &str) -> &str {
    text.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or("")
}

/// Extract a clean command line from provider text.
///
/// Handles fenced code blocks, inline backticks, `$ ` markers, `Command:`
/// labels and multi-line answers mixing prose with commands (command lines
/// are joined with `&&`).
pub fn sanitize_command(text: &str) -> String {
    let mut cmd = text.trim().to_string();

    if let Some(caps) = CODE_BLOCK.captures(&cmd) {
        cmd = caps[1].trim().to_string();
    }

    if cmd.len() > 1 && cmd.starts_with('`') && cmd.ends_with('`') && !cmd.contains('\n') {
        cmd = cmd[1..cmd.len() - 1].trim().to_string();
    }

    cmd = LABEL_PREFIX.replace(&cmd, "").into_owned();

    // Trailing explanation separated by a blank line
    if let Some(idx) = cmd.find("\n\n") {
        cmd.truncate(idx);
    }

    let lines: Vec<&str> = cmd.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    if lines.len() > 1 {
        // `#` lines are comments here, not root prompt markers
        let command_lines: Vec<String> = lines
            .iter()
            .filter(|l| !(l.starts_with('#') && !l.starts_with("#!")))
            .map(|l| l.trim_start_matches("$ ").trim_start_matches("> ").trim())
            .filter(|l| !l.starts_with("//") && !PROSE_LINE.is_match(l) && COMMAND_START.is_match(l))
            .map(str::to_string)
            .collect();
        if !command_lines.is_empty() {
            cmd = command_lines.join(" && ");
        }
    } else {
        cmd = PROMPT_MARKER.replace(&cmd, "").into_owned();
    }

    cmd.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_color_and_cursor_sequences() {
        let raw = "\x1b[01;32muser@host\x1b[00m:\x1b[01;34m~\x1b[00m$ \x1b[K";
        assert_eq!(strip_ansi(raw), "user@host:~$ ");
    }

    #[test]
    fn test_strips_osc_title() {
        let raw = "\x1b]0;user@host: ~\x07user@host:~$ ";
        assert_eq!(strip_ansi(raw), "user@host:~$ ");
    }

    #[test]
    fn test_folds_crlf_and_drops_controls() {
        let raw = "line one\r\nline\x08 two\r\n\x07done";
        assert_eq!(strip_ansi(raw), "line one\nline two\ndone");
    }

    #[test]
    fn test_never_leaves_escape_bytes() {
        let inputs = [
            "\x1b",
            "\x1b[",
            "\x1b[31",
            "\x1b]0;unterminated title",
            "abc\x1b\x1b[2Jdef",
            "\x1b[?2004h\x1b[?1049l",
            "mixed \x1b(B text \x1b=",
        ];
        for input in inputs {
            let out = strip_ansi(input);
            assert!(!out.contains('\x1b'), "escape left in {:?} -> {:?}", input, out);
        }
    }

    #[test]
    fn test_strips_charset_and_keypad_escapes() {
        assert_eq!(strip_ansi("mixed \x1b(B text \x1b="), "mixed  text ");
        assert_eq!(strip_ansi("\x1b)0\x1b>\x1b#8done"), "done");
        assert_eq!(strip_ansi("\x1b7saved\x1b8"), "saved");
    }

    #[test]
    fn test_invalid_utf8_is_lossy() {
        let out = strip_ansi_bytes(b"ok \xff\xfe done");
        assert!(out.starts_with("ok "));
        assert!(out.ends_with(" done"));
    }

    #[test]
    fn test_decoder_joins_split_sequences() {
        let mut decoder = StreamDecoder::new();
        let (_, a) = decoder.push(b"ok\x1b[3");
        let (_, b) = decoder.push(b"2mgreen\x1b[0m\r");
        let (_, c) = decoder.push(b"\n\xc3");
        let (raw, d) = decoder.push(b"\xa9t\xc3\xa9");
        assert_eq!(a, "ok");
        assert_eq!(b, "green");
        assert_eq!(c, "\n");
        assert_eq!(d, "été");
        assert_eq!(raw, "été");
        assert_eq!(decoder.finish(), "");
    }

    #[test]
    fn test_decoder_holds_split_charset_escape() {
        let mut decoder = StreamDecoder::new();
        let (_, a) = decoder.push(b"top\x1b(");
        let (_, b) = decoder.push(b"Bbottom");
        assert_eq!(a, "top");
        assert_eq!(b, "bottom");
    }

    #[test]
    fn test_decoder_holds_unterminated_title() {
        let mut decoder = StreamDecoder::new();
        let (_, a) = decoder.push(b"\x1b]0;user@host");
        let (_, b) = decoder.push(b": ~\x07user@host:~$ ");
        assert_eq!(a, "");
        assert_eq!(b, "user@host:~$ ");
    }

    #[test]
    fn test_decoder_finish_flushes() {
        let mut decoder = StreamDecoder::new();
        let (_, a) = decoder.push(b"tail\r");
        assert_eq!(a, "tail");
        assert_eq!(decoder.finish(), "");
        decoder.push(b"\x1b[");
        assert!(!decoder.finish().contains('\x1b'));
    }

    #[test]
    fn test_last_non_empty_line() {
        assert_eq!(last_non_empty_line("a\nb\n\n  \n"), "b");
        assert_eq!(last_non_empty_line(""), "");
    }

    #[test]
    fn test_sanitize_fenced_block() {
        let text = "Here you go:\n```bash\nsudo apt-get update -y\n```";
        assert_eq!(sanitize_command(text), "sudo apt-get update -y");
    }

    #[test]
    fn test_sanitize_inline_and_prefixes() {
        assert_eq!(sanitize_command("`df -h`"), "df -h");
        assert_eq!(sanitize_command("$ uname -a"), "uname -a");
        assert_eq!(sanitize_command("Command: free -m"), "free -m");
    }

    #[test]
    fn test_sanitize_multiline_drops_prose() {
        let text = "# refresh index\napt-get update\nThen install it\napt-get install -y nginx";
        assert_eq!(sanitize_command(text), "apt-get update && apt-get install -y nginx");
    }

    #[test]
    fn test_sanitize_cuts_trailing_explanation() {
        let text = "systemctl restart nginx\n\nThis restarts the web server.";
        assert_eq!(sanitize_command(text), "systemctl restart nginx");
    }
}
