//! ANSI text handling: color tags in outgoing text, and cleanup of raw
//! incoming lines.
//!
//! Outgoing text uses a small tag markup: `{red}danger{/}` renders as red
//! text on color-capable clients, plain text on `mono` clients, and is
//! stripped entirely for `strip` clients. Content files and scripts use the
//! same markup.

use std::str::FromStr;
use strum_macros::EnumString;

/// The standard 16 terminal colors, plus bold and reset markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
#[strum(serialize_all = "kebab_case")]
pub enum Color {
  Black,
  Red,
  Green,
  Yellow,
  Blue,
  Magenta,
  Cyan,
  White,
  BrightBlack,
  BrightRed,
  BrightGreen,
  BrightYellow,
  BrightBlue,
  BrightMagenta,
  BrightCyan,
  BrightWhite,
}

impl Color {
  pub fn code(&self) -> &'static str {
    match self {
      Color::Black => "\x1b[30m",
      Color::Red => "\x1b[31m",
      Color::Green => "\x1b[32m",
      Color::Yellow => "\x1b[33m",
      Color::Blue => "\x1b[34m",
      Color::Magenta => "\x1b[35m",
      Color::Cyan => "\x1b[36m",
      Color::White => "\x1b[37m",
      Color::BrightBlack => "\x1b[90m",
      Color::BrightRed => "\x1b[91m",
      Color::BrightGreen => "\x1b[92m",
      Color::BrightYellow => "\x1b[93m",
      Color::BrightBlue => "\x1b[94m",
      Color::BrightMagenta => "\x1b[95m",
      Color::BrightCyan => "\x1b[96m",
      Color::BrightWhite => "\x1b[97m",
    }
  }

  pub fn tag(&self) -> String {
    // The tag is the kebab-case name, which strum gives us via Display... but
    // strum 0.20 needs a separate derive for that, so we just match the code.
    let name = match self {
      Color::Black => "black",
      Color::Red => "red",
      Color::Green => "green",
      Color::Yellow => "yellow",
      Color::Blue => "blue",
      Color::Magenta => "magenta",
      Color::Cyan => "cyan",
      Color::White => "white",
      Color::BrightBlack => "bright-black",
      Color::BrightRed => "bright-red",
      Color::BrightGreen => "bright-green",
      Color::BrightYellow => "bright-yellow",
      Color::BrightBlue => "bright-blue",
      Color::BrightMagenta => "bright-magenta",
      Color::BrightCyan => "bright-cyan",
      Color::BrightWhite => "bright-white",
    };
    format!("{{{name}}}")
  }
}

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";

/// How a session wants its text rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
#[strum(serialize_all = "kebab_case")]
pub enum RenderMode {
  /// Full color.
  Default,
  /// Bold and reset only; colors dropped.
  Mono,
  /// All markup removed.
  Strip,
}

/// Expands `{...}` tags in `text` according to the render mode. Unknown tags
/// are passed through untouched, so stray braces in content are harmless.
pub fn render(text: &str, mode: RenderMode) -> String {
  let mut out = String::with_capacity(text.len());
  let mut rest = text;
  while let Some(start) = rest.find('{') {
    out.push_str(&rest[..start]);
    rest = &rest[start..];
    let end = match rest.find('}') {
      Some(e) => e,
      None => break,
    };
    let tag = &rest[1..end];
    let known = match tag {
      "/" | "reset" => Some(match mode {
        RenderMode::Strip => "",
        _ => RESET,
      }),
      "bold" => Some(match mode {
        RenderMode::Strip => "",
        _ => BOLD,
      }),
      _ => match Color::from_str(tag) {
        Ok(c) => Some(match mode {
          RenderMode::Default => c.code(),
          _ => "",
        }),
        Err(_) => None,
      },
    };
    match known {
      Some(code) => {
        out.push_str(code);
        rest = &rest[end + 1..];
      }
      None => {
        out.push('{');
        rest = &rest[1..];
      }
    }
  }
  out.push_str(rest);
  out
}

/// How [`apply_color_pattern`] walks its colors across the text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternMode {
  PerCharacter,
  PerWord,
}

/// Wraps the characters (or words) of `text` in the given colors, cycling.
/// The output uses tag markup, so it composes with [`render`].
pub fn apply_color_pattern(text: &str, colors: &[Color], mode: PatternMode) -> String {
  if colors.is_empty() {
    return text.into();
  }
  let mut out = String::with_capacity(text.len() * 2);
  let mut i = 0;
  match mode {
    PatternMode::PerCharacter => {
      for c in text.chars() {
        if c.is_whitespace() {
          out.push(c);
          continue;
        }
        out.push_str(&colors[i % colors.len()].tag());
        out.push(c);
        i += 1;
      }
    }
    PatternMode::PerWord => {
      for (j, word) in text.split(' ').enumerate() {
        if j > 0 {
          out.push(' ');
        }
        if word.is_empty() {
          continue;
        }
        out.push_str(&colors[i % colors.len()].tag());
        out.push_str(word);
        i += 1;
      }
    }
  }
  out.push_str("{/}");
  out
}

/// Cleans one raw line read from a client: applies backspaces, skips telnet
/// IAC sequences and ANSI/cursor escape sequences, and drops every other
/// control character. The trailing CR of a CRLF line ending is handled by the
/// line splitter, not here.
pub fn clean_input_line(raw: &[u8]) -> String {
  let mut bytes: Vec<u8> = Vec::with_capacity(raw.len());
  let mut i = 0;
  while i < raw.len() {
    let b = raw[i];
    match b {
      // telnet IAC: skip the command byte, and the option byte for the
      // three-byte forms (WILL/WONT/DO/DONT).
      0xff => {
        i += 1;
        if let Some(&cmd) = raw.get(i) {
          i += 1;
          if (0xfb..=0xfe).contains(&cmd) {
            i += 1;
          }
        }
        continue;
      }
      // Escape sequences: CSI (`ESC [`) runs until a byte in `@..=~`, and a
      // two-byte `ESC x` form otherwise. Covers arrow keys and friends.
      0x1b => {
        i += 1;
        if raw.get(i) == Some(&b'[') {
          i += 1;
          while let Some(&c) = raw.get(i) {
            i += 1;
            if (0x40..=0x7e).contains(&c) {
              break;
            }
          }
        } else if raw.get(i).is_some() {
          i += 1;
        }
        continue;
      }
      // Backspace and DEL remove the previous byte.
      0x08 | 0x7f => {
        bytes.pop();
      }
      b'\r' => {}
      c if c < 0x20 && c != b'\t' => {}
      c => bytes.push(c),
    }
    i += 1;
  }
  String::from_utf8_lossy(&bytes).into_owned()
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;

  #[test]
  fn render_modes() {
    let src = "a {red}b{/} c";
    assert_eq!(render(src, RenderMode::Default), "a \x1b[31mb\x1b[0m c");
    assert_eq!(render(src, RenderMode::Mono), "a b\x1b[0m c");
    assert_eq!(render(src, RenderMode::Strip), "a b c");
  }

  #[test]
  fn unknown_tags_pass_through() {
    assert_eq!(render("say {hello}", RenderMode::Default), "say {hello}");
    assert_eq!(render("brace {", RenderMode::Strip), "brace {");
  }

  #[test]
  fn color_pattern_cycles() {
    let out = apply_color_pattern("ab", &[Color::Red, Color::Blue], PatternMode::PerCharacter);
    assert_eq!(out, "{red}a{blue}b{/}");
    let out = apply_color_pattern("hi there all", &[Color::Red, Color::Blue], PatternMode::PerWord);
    assert_eq!(out, "{red}hi {blue}there {red}all{/}");
  }

  #[test]
  fn input_cleanup() {
    assert_eq!(clean_input_line(b"north\r"), "north");
    assert_eq!(clean_input_line(b"nortj\x08h"), "north");
    assert_eq!(clean_input_line(b"no\x1b[Arth"), "north");
    assert_eq!(clean_input_line(b"\xff\xfb\x01north"), "north");
  }
}
