//! C7 — the snippet and marker codec.
//!
//! Wraps a snippet's body in an in-band, language-appropriate comment
//! pair (`FX:BEGIN id=... checksum=...` / `FX:END id=...`) so that
//! rendered text can be pasted, edited by hand or by another tool, and
//! scanned back into patches without needing a side-channel map from
//! text offsets to node ids.

use std::collections::HashMap;
use std::fmt::Write as _;

#[derive(Debug, Clone, Copy)]
enum CommentStyle {
    Line(&'static str),
    Block(&'static str, &'static str),
}

fn style_for(lang: &str) -> CommentStyle {
    match lang.to_ascii_lowercase().as_str() {
        "js" | "jsx" | "ts" | "tsx" | "c" | "cpp" | "h" | "hpp" | "cs" | "go" | "java" | "kt"
        | "swift" | "rust" | "rs" | "css" | "scss" | "less" | "php" | "dart" | "scala" => {
            CommentStyle::Block("/*", "*/")
        }
        "py" | "sh" | "bash" | "zsh" | "ruby" | "rb" | "yaml" | "yml" | "perl" | "pl" | "r"
        | "makefile" | "toml" => CommentStyle::Line("#"),
        "html" | "xml" | "svg" | "md" | "markdown" | "vue" => CommentStyle::Block("<!--", "-->"),
        "ini" | "cfg" => CommentStyle::Line(";"),
        "sql" | "lua" | "hs" | "haskell" => CommentStyle::Line("--"),
        _ => CommentStyle::Line("#"),
    }
}

/// Weak 32-bit rolling checksum, matching the wire format used
/// throughout the rendered text surface: `h = h*31 + byte (mod 2^32)`,
/// printed as 8 lowercase hex digits. Not cryptographic: it only needs
/// to catch accidental hand-edits, not adversarial tampering (the WAL
/// and UArr layers use `crc32fast` where integrity actually matters).
#[must_use]
pub fn checksum(body: &str) -> String {
    let mut h: u32 = 0;
    for b in body.bytes() {
        h = h.wrapping_mul(31).wrapping_add(u32::from(b));
    }
    format!("{h:08x}")
}

fn begin_line(style: CommentStyle, id: &str, body_checksum: &str, meta: &HashMap<String, String>) -> String {
    let mut tag = format!("FX:BEGIN id={id} checksum={body_checksum}");
    let mut keys: Vec<&String> = meta.keys().collect();
    keys.sort();
    for k in keys {
        let _ = write!(tag, " {k}={}", meta[k]);
    }
    wrap_tag(style, &tag)
}

fn end_line(style: CommentStyle, id: &str) -> String {
    wrap_tag(style, &format!("FX:END id={id}"))
}

fn wrap_tag(style: CommentStyle, tag: &str) -> String {
    match style {
        CommentStyle::Line(prefix) => format!("{prefix} {tag}"),
        CommentStyle::Block(prefix, suffix) => format!("{prefix} {tag} {suffix}"),
    }
}

/// Normalize line endings to LF: `\r\n` and lone `\r` both become `\n`.
/// Checksums and stored bodies are always compared after this pass, so a
/// snippet edited on Windows checksums identically to the same text with
/// Unix line endings.
#[must_use]
pub fn normalize_eol(s: &str) -> String {
    s.replace("\r\n", "\n").replace('\r', "\n")
}

/// Render `body` wrapped in `FX:BEGIN`/`FX:END` markers appropriate
/// for `lang`.
#[must_use]
pub fn wrap(id: &str, body: &str, lang: &str, meta: &HashMap<String, String>) -> String {
    let style = style_for(lang);
    // Checksums are computed over the canonical form of the body: line
    // endings normalized to LF, then a single trailing newline, since
    // that is what scanning the marker back out of rendered text
    // reconstructs (see `to_patches`).
    let body = normalize_eol(body);
    let normalized = if body.is_empty() || body.ends_with('\n') { body } else { format!("{body}\n") };
    let sum = checksum(&normalized);
    let mut out = String::new();
    out.push_str(&begin_line(style, id, &sum, meta));
    out.push('\n');
    out.push_str(&normalized);
    out.push_str(&end_line(style, id));
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patch {
    pub id: String,
    pub body: String,
    pub declared_checksum: String,
    pub meta: HashMap<String, String>,
}

impl Patch {
    /// Whether the body's current checksum matches the checksum
    /// declared in its `BEGIN` marker (i.e. whether the marker line
    /// itself was left untouched by whatever edited the body).
    #[must_use]
    pub fn checksum_matches(&self) -> bool {
        checksum(&self.body) == self.declared_checksum
    }
}

struct ParsedBegin {
    id: String,
    checksum: String,
    meta: HashMap<String, String>,
}

fn parse_begin(line: &str) -> Option<ParsedBegin> {
    let idx = line.find("FX:BEGIN")?;
    let rest = &line[idx + "FX:BEGIN".len()..];
    let rest = rest.trim_end_matches(['*', '/', '>', '-', ' ']).trim();
    let mut id = None;
    let mut checksum = None;
    let mut meta = HashMap::new();
    for token in rest.split_whitespace() {
        let (key, value) = token.split_once('=')?;
        match key {
            "id" => id = Some(value.to_string()),
            "checksum" => checksum = Some(value.to_string()),
            other => {
                meta.insert(other.to_string(), value.to_string());
            }
        }
    }
    Some(ParsedBegin { id: id?, checksum: checksum.unwrap_or_default(), meta })
}

fn parse_end(line: &str) -> Option<String> {
    let idx = line.find("FX:END")?;
    let rest = &line[idx + "FX:END".len()..];
    let rest = rest.trim_end_matches(['*', '/', '>', '-', ' ']).trim();
    for token in rest.split_whitespace() {
        if let Some((key, value)) = token.split_once('=')
            && key == "id"
        {
            return Some(value.to_string());
        }
    }
    None
}

struct Frame {
    id: String,
    checksum: String,
    meta: HashMap<String, String>,
    lines: Vec<String>,
}

/// Scan rendered text for `FX:BEGIN`/`FX:END` pairs and produce one
/// [`Patch`] per balanced pair, in the order their `BEGIN` marker
/// appeared. Markers opened but never closed (and stray `END` markers
/// with no open frame of that id) are dropped rather than erroring:
/// a human editing rendered text is expected to occasionally mangle a
/// marker, and the rest of the document should still round-trip.
/// Nested markers are tolerated: an outer snippet's body includes the
/// full text of any marker pairs nested inside it, inner and outer each
/// still producing their own patch.
#[must_use]
pub fn to_patches(text: &str) -> Vec<Patch> {
    let mut stack: Vec<Frame> = Vec::new();
    let mut patches = Vec::new();

    for line in text.lines() {
        if let Some(begin) = parse_begin(line) {
            for frame in &mut stack {
                frame.lines.push(line.to_string());
            }
            stack.push(Frame { id: begin.id, checksum: begin.checksum, meta: begin.meta, lines: Vec::new() });
            continue;
        }
        if let Some(end_id) = parse_end(line) {
            if let Some(pos) = stack.iter().rposition(|f| f.id == end_id) {
                // Frames opened after `pos` and never closed are unbalanced; drop them.
                stack.truncate(pos + 1);
                let frame = stack.pop().expect("position found above");
                for ancestor in &mut stack {
                    ancestor.lines.push(line.to_string());
                }
                let mut body = frame.lines.join("\n");
                if !frame.lines.is_empty() {
                    body.push('\n');
                }
                patches.push(Patch { id: frame.id, body, declared_checksum: frame.checksum, meta: frame.meta });
            } else {
                // Stray END with no matching open frame: treat as ordinary content.
                for frame in &mut stack {
                    frame.lines.push(line.to_string());
                }
            }
            continue;
        }
        for frame in &mut stack {
            frame.lines.push(line.to_string());
        }
    }
    patches
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> HashMap<String, String> {
        HashMap::new()
    }

    #[test]
    fn wrap_and_parse_round_trips() {
        let rendered = wrap("abc123", "fn main() {}", "rust", &meta());
        let patches = to_patches(&rendered);
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].id, "abc123");
        assert_eq!(patches[0].body.trim_end(), "fn main() {}");
        assert!(patches[0].checksum_matches());
    }

    #[test]
    fn different_comment_styles_all_parse() {
        for lang in ["python", "py", "html", "sql", "ini", "rust"] {
            let rendered = wrap("id1", "body text", lang, &meta());
            let patches = to_patches(&rendered);
            assert_eq!(patches.len(), 1, "failed for {lang}");
        }
    }

    #[test]
    fn unbalanced_begin_is_dropped() {
        let text = "/* FX:BEGIN id=x checksum=00000000 */\nsome code\n";
        assert!(to_patches(text).is_empty());
    }

    #[test]
    fn stray_end_is_ignored() {
        let text = "# FX:END id=ghost\nordinary text\n";
        assert!(to_patches(text).is_empty());
    }

    #[test]
    fn nested_markers_both_produce_patches() {
        let inner = wrap("inner", "inner body", "rust", &meta());
        let outer_body = format!("before\n{inner}\nafter");
        let outer = wrap("outer", &outer_body, "rust", &meta());
        let patches = to_patches(&outer);
        let ids: Vec<&str> = patches.iter().map(|p| p.id.as_str()).collect();
        assert!(ids.contains(&"inner"));
        assert!(ids.contains(&"outer"));
        let outer_patch = patches.iter().find(|p| p.id == "outer").unwrap();
        assert!(outer_patch.body.contains("FX:BEGIN id=inner"));
    }

    #[test]
    fn meta_round_trips_through_marker() {
        let mut m = HashMap::new();
        m.insert("lang".to_string(), "rust".to_string());
        let rendered = wrap("x", "body", "rust", &m);
        let patches = to_patches(&rendered);
        assert_eq!(patches[0].meta.get("lang").map(String::as_str), Some("rust"));
    }

    #[test]
    fn checksum_changes_when_body_edited_by_hand() {
        let rendered = wrap("x", "original", "rust", &meta());
        let tampered = rendered.replace("original", "edited by hand");
        let patches = to_patches(&tampered);
        assert!(!patches[0].checksum_matches());
    }

    #[test]
    fn crlf_and_lf_bodies_checksum_the_same() {
        let lf = "line one\nline two\n";
        let crlf = "line one\r\nline two\r\n";
        assert_eq!(checksum(&normalize_eol(lf)), checksum(&normalize_eol(crlf)));
    }

    #[test]
    fn wrap_normalizes_crlf_before_checksumming() {
        let crlf = wrap("x", "a\r\nb\r\n", "rust", &meta());
        let lf = wrap("x", "a\nb\n", "rust", &meta());
        let crlf_patch = &to_patches(&crlf)[0];
        let lf_patch = &to_patches(&lf)[0];
        assert_eq!(crlf_patch.declared_checksum, lf_patch.declared_checksum);
    }
}
