use std::borrow::Cow;

/// Make a server-provided label safe to print on a single terminal line.
///
/// Channel names, descriptions, and error strings come from the proxy's
/// configuration and are echoed by the CLI. This removes anything that could
/// drive the terminal:
///
/// - CSI sequences (`ESC [` ... final byte `0x40..=0x7E`)
/// - OSC sequences (`ESC ]` ... terminated by BEL or `ESC \`)
/// - any other ESC, C0 control, or DEL
///
/// Tabs and line breaks collapse to a single space so a label never spans rows.
/// Clean input is returned borrowed.
pub fn sanitize_label(s: &str) -> Cow<'_, str> {
    if !s.chars().any(needs_rewrite) {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\x1b' => match chars.peek() {
                Some('[') => {
                    chars.next();
                    for c in chars.by_ref() {
                        if ('\x40'..='\x7e').contains(&c) {
                            break;
                        }
                    }
                }
                Some(']') => {
                    chars.next();
                    while let Some(c) = chars.next() {
                        if c == '\x07' {
                            break;
                        }
                        if c == '\x1b' && chars.peek() == Some(&'\\') {
                            chars.next();
                            break;
                        }
                    }
                }
                _ => {}
            },
            '\t' | '\n' | '\r' => {
                if !out.ends_with(' ') {
                    out.push(' ');
                }
            }
            c if c.is_ascii_control() => {}
            c => out.push(c),
        }
    }

    Cow::Owned(out)
}

fn needs_rewrite(c: char) -> bool {
    c.is_ascii_control()
}
