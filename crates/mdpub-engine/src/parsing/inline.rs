//! Inline markup reconstruction.
//!
//! Block payloads store inline content as markdown source, so literal text
//! coming out of the tokenizer has to be escaped before it is appended.
//! Everything here is chosen so that re-tokenizing the produced markup gives
//! back the same text.

/// Punctuation that is always backslash-escaped inside inline text.
const ALWAYS_ESCAPED: &[char] = &[
    '\\', '`', '*', '_', '[', ']', '<', '>', '&', '~', '|', '{', '}',
];

/// Characters that only start a construct at the beginning of a line.
const LINE_START_ESCAPED: &[char] = &['#', '-', '+', '='];

/// Append literal `text` to an inline markup buffer, escaping as needed.
pub fn push_escaped(buf: &mut String, text: &str) {
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        let at_line_start = buf.is_empty() || buf.ends_with('\n');

        if ALWAYS_ESCAPED.contains(&c) || (at_line_start && LINE_START_ESCAPED.contains(&c)) {
            buf.push('\\');
            buf.push(c);
            continue;
        }

        if at_line_start && c.is_ascii_digit() {
            // `1.` or `1)` at the start of a line would open an ordered list.
            buf.push(c);
            while let Some(&d) = chars.peek() {
                if !d.is_ascii_digit() {
                    break;
                }
                buf.push(d);
                chars.next();
            }
            if let Some(&d) = chars.peek()
                && (d == '.' || d == ')')
            {
                buf.push('\\');
                buf.push(d);
                chars.next();
            }
            continue;
        }

        buf.push(c);
    }
}

/// Escape literal text into a fresh string.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    push_escaped(&mut out, text);
    out
}

/// Render an inline code span, picking a fence longer than any backtick run
/// inside the code.
pub fn code_span(code: &str) -> String {
    let fence = "`".repeat(longest_run(code, '`') + 1);
    // Readers only strip padding from spans with something besides spaces.
    let pad = if code.trim().is_empty() {
        ""
    } else if code.starts_with(['`', ' ']) || code.ends_with(['`', ' ']) {
        " "
    } else {
        ""
    };
    format!("{fence}{pad}{code}{pad}{fence}")
}

/// Length of the longest run of `needle` in `text`.
pub fn longest_run(text: &str, needle: char) -> usize {
    let mut longest = 0;
    let mut current = 0;
    for c in text.chars() {
        if c == needle {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }
    longest
}

/// Format a link or image destination plus optional title, as it appears
/// between the parentheses of `[text](...)`.
pub fn destination(url: &str, title: &str) -> String {
    let url = if url.is_empty() || url.contains([' ', '(', ')', '<', '>']) {
        format!("<{}>", url.replace('<', "\\<").replace('>', "\\>"))
    } else {
        url.to_string()
    };

    if title.is_empty() {
        url
    } else {
        format!("{url} \"{}\"", title.replace('\\', "\\\\").replace('"', "\\\""))
    }
}
