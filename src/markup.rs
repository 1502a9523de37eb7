//! Tolerant scanner for preview markup coming back from an editable surface.
//!
//! Only what reconciliation needs is recovered: elements that carry a
//! `data-field` locator and their text content. Anything the scanner does not
//! understand is read as text or skipped; it never fails.

use crate::record::Locator;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedText {
    pub locator: Locator,
    pub text: String,
}

const VOID_ELEMENTS: [&str; 8] = ["br", "hr", "img", "input", "meta", "link", "wbr", "col"];
const RAW_TEXT_ELEMENTS: [&str; 2] = ["script", "style"];

struct Open {
    name: String,
    capture: Option<usize>,
}

struct Tag {
    name: String,
    closing: bool,
    self_closing: bool,
    attrs: Vec<(String, String)>,
}

impl Tag {
    fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn locator(&self) -> Option<Locator> {
        let field = self.attr("data-field")?;
        Locator::from_parts(field, self.attr("data-section"), self.attr("data-index"))
    }
}

/// Collects every located element in document order (by opening tag).
/// Text content of a located element includes all descendant text, with
/// `<br>` read as a newline.
pub fn scan_located(markup: &str) -> Vec<LocatedText> {
    let mut found: Vec<LocatedText> = Vec::new();
    let mut stack: Vec<Open> = Vec::new();
    let mut pos = 0;

    while pos < markup.len() {
        let rest = &markup[pos..];
        let Some(lt) = rest.find('<') else {
            push_text(&mut found, &stack, &decode_entities(rest));
            break;
        };
        if lt > 0 {
            push_text(&mut found, &stack, &decode_entities(&rest[..lt]));
            pos += lt;
            continue;
        }

        if rest.starts_with("<!--") {
            pos += rest.find("-->").map(|i| i + 3).unwrap_or(rest.len());
            continue;
        }
        if rest.starts_with("<!") || rest.starts_with("<?") {
            pos += rest.find('>').map(|i| i + 1).unwrap_or(rest.len());
            continue;
        }

        let Some((tag, consumed)) = parse_tag(rest) else {
            // A lone '<' that does not open a tag is text.
            push_text(&mut found, &stack, "<");
            pos += 1;
            continue;
        };
        pos += consumed;

        if tag.closing {
            if let Some(depth) = stack.iter().rposition(|o| o.name == tag.name) {
                stack.truncate(depth);
            }
            continue;
        }

        if tag.name == "br" {
            push_text(&mut found, &stack, "\n");
            continue;
        }
        if RAW_TEXT_ELEMENTS.contains(&tag.name.as_str()) && !tag.self_closing {
            let close = format!("</{}", tag.name);
            let body = &markup[pos..];
            pos += find_ascii_ci(body, &close)
                .map(|i| i + body[i..].find('>').map(|j| j + 1).unwrap_or(body.len() - i))
                .unwrap_or(body.len());
            continue;
        }

        let capture = tag.locator().map(|locator| {
            found.push(LocatedText {
                locator,
                text: String::new(),
            });
            found.len() - 1
        });
        if tag.self_closing || VOID_ELEMENTS.contains(&tag.name.as_str()) {
            continue;
        }
        stack.push(Open {
            name: tag.name,
            capture,
        });
    }

    found
}

fn push_text(found: &mut [LocatedText], stack: &[Open], text: &str) {
    if text.is_empty() {
        return;
    }
    for open in stack {
        if let Some(i) = open.capture {
            found[i].text.push_str(text);
        }
    }
}

fn find_ascii_ci(haystack: &str, needle: &str) -> Option<usize> {
    let hay = haystack.as_bytes();
    let needle = needle.as_bytes();
    if needle.len() > hay.len() {
        return None;
    }
    (0..=hay.len() - needle.len()).find(|&i| hay[i..i + needle.len()].eq_ignore_ascii_case(needle))
}

/// Parses a tag starting at `s[0] == '<'`. Returns the tag and the number of
/// bytes consumed, or `None` if `s` does not start a well-formed tag.
fn parse_tag(s: &str) -> Option<(Tag, usize)> {
    let bytes = s.as_bytes();
    let mut i = 1;
    let closing = bytes.get(i) == Some(&b'/');
    if closing {
        i += 1;
    }
    let name_start = i;
    while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'-') {
        i += 1;
    }
    if i == name_start {
        return None;
    }
    let name = s[name_start..i].to_ascii_lowercase();

    let mut attrs = Vec::new();
    let mut self_closing = false;
    loop {
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        match bytes.get(i) {
            None => return None,
            Some(b'>') => {
                i += 1;
                break;
            }
            Some(b'/') => {
                self_closing = true;
                i += 1;
                continue;
            }
            Some(_) => {}
        }

        let key_start = i;
        while i < bytes.len()
            && !bytes[i].is_ascii_whitespace()
            && !matches!(bytes[i], b'=' | b'>' | b'/')
        {
            i += 1;
        }
        let key = s[key_start..i].to_ascii_lowercase();
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        let mut value = String::new();
        if bytes.get(i) == Some(&b'=') {
            i += 1;
            while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            match bytes.get(i) {
                Some(&q) if q == b'"' || q == b'\'' => {
                    let start = i + 1;
                    let end = start + s[start..].find(q as char)?;
                    value = decode_entities(&s[start..end]);
                    i = end + 1;
                }
                Some(_) => {
                    let start = i;
                    while i < bytes.len() && !bytes[i].is_ascii_whitespace() && bytes[i] != b'>' {
                        i += 1;
                    }
                    value = decode_entities(&s[start..i]);
                }
                None => return None,
            }
        }
        if !key.is_empty() {
            self_closing = false;
            attrs.push((key, value));
        }
    }

    Some((
        Tag {
            name,
            closing,
            self_closing,
            attrs,
        },
        i,
    ))
}

/// Decodes character references. `&nbsp;` reads as a plain space since
/// editable surfaces use it for typed spaces. Unknown references stay as
/// written.
pub fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let decoded = rest[1..]
            .find(';')
            .filter(|&semi| semi > 0 && semi <= 10)
            .and_then(|semi| decode_reference(&rest[1..1 + semi]).map(|c| (c, semi + 2)));
        match decoded {
            Some((c, len)) => {
                out.push(c);
                rest = &rest[len..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_reference(name: &str) -> Option<char> {
    if let Some(num) = name.strip_prefix('#') {
        let code = match num.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse::<u32>().ok()?,
        };
        return char::from_u32(code);
    }
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some(' '),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{AcademicField, RecordField};

    #[test]
    fn reads_located_spans_in_order() {
        let markup = r#"<p data-block="intro"><span class="plaafp-field" data-field="studentName">Jordan</span> is a <span data-field='grade'>4th</span> grade</p>
<h2><span data-field="subject" data-section="academic" data-index="0">Math</span></h2>"#;
        let got = scan_located(markup);
        assert_eq!(
            got,
            vec![
                LocatedText {
                    locator: Locator::TopLevel(RecordField::StudentName),
                    text: "Jordan".into()
                },
                LocatedText {
                    locator: Locator::TopLevel(RecordField::Grade),
                    text: "4th".into()
                },
                LocatedText {
                    locator: Locator::academic(0, AcademicField::Subject),
                    text: "Math".into()
                },
            ]
        );
    }

    #[test]
    fn text_content_spans_nested_markup_and_entities() {
        let markup = r#"<span data-field="strengths">reading <b>fluency</b> &amp; decoding<br>at&nbsp;grade&#46;</span>"#;
        let got = scan_located(markup);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].text, "reading fluency & decoding\nat grade.");
    }

    #[test]
    fn ignores_untagged_and_unresolvable_elements() {
        let markup = r#"<span data-field="nope">x</span><span>y</span><span data-field="subject">z</span>"#;
        assert!(scan_located(markup).is_empty());
    }

    #[test]
    fn garbage_yields_nothing_and_does_not_panic() {
        for s in ["", "<<<>>>", "<span data-field=\"grade", "&#xZZ; <p", "<!-- open", "\u{1F600}<\u{e9}>"] {
            assert!(scan_located(s).is_empty(), "{s:?}");
        }
    }

    #[test]
    fn closing_parent_ends_unclosed_span() {
        let got = scan_located(r#"<p><span data-field="grade">5th</p> trailing"#);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].text, "5th");
    }

    #[test]
    fn script_bodies_are_skipped() {
        let got = scan_located(
            r#"<span data-field="grade">5<script>document.write('<span data-field="behavior">x</span>')</script>th</span>"#,
        );
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].text, "5th");
    }

    #[test]
    fn decode_leaves_unknown_references_alone() {
        assert_eq!(decode_entities("a &copy; b & c &#60;"), "a &copy; b & c <");
    }
}
