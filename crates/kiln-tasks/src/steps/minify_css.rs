//! Built-in CSS minifier
//!
//! Removes comments (except `/*! ... */` notices), collapses whitespace and
//! drops the last semicolon of each block. String literals are copied as-is.

use crate::asset::Asset;

use super::StepError;

/// Characters after which whitespace is never needed
const TIGHT_AFTER: &[char] = &['{', '}', ';', ',', '>', ':', '('];
/// Characters before which whitespace is never needed
const TIGHT_BEFORE: &[char] = &['{', '}', ';', ',', '>', ')'];

/// Minify a stylesheet
pub fn minify(css: &str) -> String {
    let mut out = String::with_capacity(css.len());
    let mut pending_space = false;
    let mut chars = css.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' | '\'' => {
                flush_space(&mut out, &mut pending_space, c);
                out.push(c);
                while let Some(s) = chars.next() {
                    out.push(s);
                    if s == '\\' {
                        if let Some(escaped) = chars.next() {
                            out.push(escaped);
                        }
                    } else if s == c {
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let keep = chars.peek() == Some(&'!');
                let mut comment = String::from("/*");
                let mut prev = '\0';
                for s in chars.by_ref() {
                    comment.push(s);
                    if prev == '*' && s == '/' {
                        break;
                    }
                    prev = s;
                }
                if keep {
                    flush_space(&mut out, &mut pending_space, '/');
                    out.push_str(&comment);
                } else {
                    pending_space = true;
                }
            }
            c if c.is_whitespace() => pending_space = true,
            _ => {
                if c == '}' && out.ends_with(';') {
                    out.pop();
                }
                flush_space(&mut out, &mut pending_space, c);
                out.push(c);
            }
        }
    }

    out.trim().to_string()
}

fn flush_space(out: &mut String, pending: &mut bool, next: char) {
    if !std::mem::take(pending) {
        return;
    }
    let tight_after = out.chars().last().map_or(true, |l| TIGHT_AFTER.contains(&l));
    if !tight_after && !TIGHT_BEFORE.contains(&next) {
        out.push(' ');
    }
}

/// Minify a stylesheet asset in place
pub fn minify_asset(mut asset: Asset) -> Result<Asset, StepError> {
    let css = std::str::from_utf8(&asset.contents).map_err(|_| StepError::NotUtf8 {
        step: "minify-css",
        path: asset.display_path(),
    })?;
    asset.contents = minify(css).into_bytes();
    Ok(asset)
}
