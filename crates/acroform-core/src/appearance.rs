//! Appearance streams for filled widgets

use lazy_static::lazy_static;
use lopdf::{Dictionary, Object, Stream};
use regex::Regex;

use crate::text::escape_content_string;

const MIN_AUTO_FONT_SIZE: f64 = 6.0;
const MAX_AUTO_FONT_SIZE: f64 = 12.0;
const TEXT_PADDING: f64 = 2.0;

lazy_static! {
    static ref DA_FONT_SIZE: Regex = Regex::new(r"(\d+(?:\.\d+)?)\s+Tf").unwrap();
}

/// Font size requested by a `/DA` string. `0` (auto) yields `None`.
pub fn font_size_from_da(da: &str) -> Option<f64> {
    DA_FONT_SIZE
        .captures(da)
        .and_then(|caps| caps[1].parse::<f64>().ok())
        .filter(|size| *size > 0.0)
}

fn auto_font_size(height: f64) -> f64 {
    (height * 0.7).clamp(MIN_AUTO_FONT_SIZE, MAX_AUTO_FONT_SIZE)
}

fn fmt_num(value: f64) -> String {
    let rounded = (value * 1000.0).round() / 1000.0;
    if rounded.fract() == 0.0 {
        format!("{}", rounded as i64)
    } else {
        format!("{}", rounded)
    }
}

fn helvetica_resources() -> Dictionary {
    let mut font_dict = Dictionary::new();
    font_dict.set("Type", Object::Name(b"Font".to_vec()));
    font_dict.set("Subtype", Object::Name(b"Type1".to_vec()));
    font_dict.set("BaseFont", Object::Name(b"Helvetica".to_vec()));
    font_dict.set("Encoding", Object::Name(b"WinAnsiEncoding".to_vec()));

    let mut fonts = Dictionary::new();
    fonts.set("Helv", Object::Dictionary(font_dict));

    let mut resources = Dictionary::new();
    resources.set("Font", Object::Dictionary(fonts));
    resources
}

fn form_xobject(width: f64, height: f64, resources: Option<Dictionary>, content: Vec<u8>) -> Stream {
    let mut stream_dict = Dictionary::new();
    stream_dict.set("Type", Object::Name(b"XObject".to_vec()));
    stream_dict.set("Subtype", Object::Name(b"Form".to_vec()));
    stream_dict.set(
        "BBox",
        Object::Array(vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Real(width as f32),
            Object::Real(height as f32),
        ]),
    );
    if let Some(resources) = resources {
        stream_dict.set("Resources", Object::Dictionary(resources));
    }
    stream_dict.set("Length", Object::Integer(content.len() as i64));

    Stream::new(stream_dict, content)
}

/// Appearance for a text or choice widget showing `text`.
///
/// Single-line fields are vertically centred; multiline fields start at the
/// top and advance one line per `\n`.
pub fn text_appearance(
    width: f64,
    height: f64,
    text: &str,
    font_size: Option<f64>,
    multiline: bool,
) -> Stream {
    let font_size = font_size.unwrap_or_else(|| auto_font_size(height));

    let mut content = Vec::new();
    content.extend_from_slice(b"/Tx BMC\nq\n");
    content.extend_from_slice(
        format!(
            "{p} {p} {w} {h} re W n\n",
            p = fmt_num(TEXT_PADDING / 2.0),
            w = fmt_num((width - TEXT_PADDING).max(0.0)),
            h = fmt_num((height - TEXT_PADDING).max(0.0)),
        )
        .as_bytes(),
    );

    if !text.is_empty() {
        content.extend_from_slice(b"BT\n0 g\n");
        content.extend_from_slice(format!("/Helv {} Tf\n", fmt_num(font_size)).as_bytes());

        if multiline {
            let leading = font_size * 1.15;
            let top = height - TEXT_PADDING - font_size;
            content.extend_from_slice(
                format!(
                    "{} TL\n{} {} Td\n",
                    fmt_num(leading),
                    fmt_num(TEXT_PADDING),
                    fmt_num(top)
                )
                .as_bytes(),
            );
            for (i, line) in text.split('\n').enumerate() {
                if i > 0 {
                    content.extend_from_slice(b"T*\n");
                }
                content.push(b'(');
                content.extend_from_slice(&escape_content_string(line));
                content.extend_from_slice(b") Tj\n");
            }
        } else {
            // Baseline offset keeps Helvetica's descenders inside the box
            let baseline = ((height - font_size) / 2.0 + font_size * 0.22).max(0.0);
            content.extend_from_slice(
                format!("{} {} Td\n(", fmt_num(TEXT_PADDING), fmt_num(baseline)).as_bytes(),
            );
            content.extend_from_slice(&escape_content_string(text));
            content.extend_from_slice(b") Tj\n");
        }
        content.extend_from_slice(b"ET\n");
    }
    content.extend_from_slice(b"Q\nEMC");

    form_xobject(width, height, Some(helvetica_resources()), content)
}

/// Appearance for one checkbox state
pub fn checkbox_appearance(width: f64, height: f64, checked: bool) -> Stream {
    let content = if checked {
        let size = width.min(height);
        let ox = (width - size) / 2.0;
        let oy = (height - size) / 2.0;
        format!(
            "q\n\
0 G\n\
{lw} w\n\
{x1} {y1} m\n\
{x2} {y2} l\n\
{x3} {y3} l\n\
S\n\
Q",
            lw = fmt_num((size * 0.1).max(1.0)),
            x1 = fmt_num(ox + size * 0.2),
            y1 = fmt_num(oy + size * 0.5),
            x2 = fmt_num(ox + size * 0.4),
            y2 = fmt_num(oy + size * 0.25),
            x3 = fmt_num(ox + size * 0.8),
            y3 = fmt_num(oy + size * 0.8),
        )
    } else {
        String::new()
    };

    form_xobject(width, height, None, content.into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content_of(stream: &Stream) -> String {
        String::from_utf8_lossy(&stream.content).into_owned()
    }

    #[test]
    fn test_font_size_from_da() {
        assert_eq!(font_size_from_da("/Helv 10 Tf 0 g"), Some(10.0));
        assert_eq!(font_size_from_da("/F1 8.5 Tf"), Some(8.5));
        assert_eq!(font_size_from_da("/Helv 0 Tf 0 g"), None);
        assert_eq!(font_size_from_da("0 g"), None);
    }

    #[test]
    fn test_auto_font_size_is_clamped() {
        assert_eq!(auto_font_size(4.0), MIN_AUTO_FONT_SIZE);
        assert_eq!(auto_font_size(100.0), MAX_AUTO_FONT_SIZE);
    }

    #[test]
    fn test_text_appearance_contains_value() {
        let stream = text_appearance(200.0, 20.0, "12345678", Some(10.0), false);
        let content = content_of(&stream);
        assert!(content.contains("(12345678) Tj"));
        assert!(content.contains("/Helv 10 Tf"));
        assert!(stream.dict.get(b"Resources").is_ok());
    }

    #[test]
    fn test_empty_text_draws_no_glyphs() {
        let stream = text_appearance(200.0, 20.0, "", None, false);
        assert!(!content_of(&stream).contains("Tj"));
    }

    #[test]
    fn test_multiline_text_breaks_lines() {
        let stream = text_appearance(200.0, 60.0, "line one\nline two", Some(10.0), true);
        let content = content_of(&stream);
        assert!(content.contains("(line one) Tj\nT*\n(line two) Tj"));
    }

    #[test]
    fn test_checkbox_states() {
        let on = checkbox_appearance(12.0, 12.0, true);
        let off = checkbox_appearance(12.0, 12.0, false);
        assert!(content_of(&on).contains(" l\n"));
        assert!(off.content.is_empty());
    }

    #[test]
    fn test_fmt_num() {
        assert_eq!(fmt_num(10.0), "10");
        assert_eq!(fmt_num(2.5), "2.5");
        assert_eq!(fmt_num(1.23456), "1.235");
    }
}
