//! Colour strings as accepted on the command line

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("\"{0}\" is not a valid colour")]
pub struct ColourError(pub String);

/// Straight (non-premultiplied) RGBA with every component in `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Colour {
    pub r: f64,
    pub g: f64,
    pub b: f64,
    pub a: f64,
}

impl Colour {
    pub const TRANSPARENT: Colour = Colour::from_rgba8(0, 0, 0, 0);

    pub const fn from_rgba8(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self {
            r: r as f64 / 255.0,
            g: g as f64 / 255.0,
            b: b as f64 / 255.0,
            a: a as f64 / 255.0,
        }
    }

    /// Parse `#rrggbb[aa]`, `0xrrggbb[aa]`, `rgb(r,g,b)` or `rgba(r,g,b,a)`
    pub fn parse(input: &str) -> Result<Self, ColourError> {
        let err = || ColourError(input.to_string());

        if let Some(hex) = input.strip_prefix('#').or_else(|| input.strip_prefix("0x")) {
            parse_hex(hex).ok_or_else(err)
        } else if let Some(body) = input.strip_prefix("rgba(") {
            let [r, g, b, a] = parse_components::<4>(body).ok_or_else(err)?;
            Ok(Self::from_rgba8(r, g, b, a))
        } else if let Some(body) = input.strip_prefix("rgb(") {
            let [r, g, b] = parse_components::<3>(body).ok_or_else(err)?;
            Ok(Self::from_rgba8(r, g, b, 255))
        } else {
            Err(err())
        }
    }

    pub fn is_transparent(&self) -> bool {
        self.a == 0.0
    }

    pub fn to_skia(self) -> tiny_skia::Color {
        tiny_skia::Color::from_rgba(self.r as f32, self.g as f32, self.b as f32, self.a as f32)
            .unwrap_or(tiny_skia::Color::TRANSPARENT)
    }
}

fn parse_hex(hex: &str) -> Option<Colour> {
    if !matches!(hex.len(), 6 | 8) || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    let a = if hex.len() == 8 { byte(6)? } else { 255 };
    Some(Colour::from_rgba8(byte(0)?, byte(2)?, byte(4)?, a))
}

fn parse_components<const N: usize>(body: &str) -> Option<[u8; N]> {
    let body = body.strip_suffix(')')?;
    let mut out = [0u8; N];
    let mut parts = body.split(',');
    for slot in out.iter_mut() {
        // Values above 255 fail the u8 parse and reject the colour.
        *slot = parts.next()?.trim().parse().ok()?;
    }
    parts.next().is_none().then_some(out)
}

impl FromStr for Colour {
    type Err = ColourError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Colour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let to8 = |v: f64| (v * 255.0).round() as u8;
        write!(
            f,
            "#{:02x}{:02x}{:02x}{:02x}",
            to8(self.r),
            to8(self.g),
            to8(self.b),
            to8(self.a)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_hex_without_alpha_is_opaque() {
        let c = Colour::parse("#112233").unwrap();
        assert!(close(c.r, 0x11 as f64 / 255.0));
        assert!(close(c.g, 0x22 as f64 / 255.0));
        assert!(close(c.b, 0x33 as f64 / 255.0));
        assert!(close(c.a, 1.0));
    }

    #[test]
    fn test_hex_with_alpha_and_0x_prefix() {
        let c = Colour::parse("0x00000000").unwrap();
        assert!(c.is_transparent());

        let c = Colour::parse("#ffffff80").unwrap();
        assert!(close(c.a, 128.0 / 255.0));
    }

    #[test]
    fn test_rgba_function() {
        let c = Colour::parse("rgba(255,0,0,128)").unwrap();
        assert!(close(c.r, 1.0));
        assert!(close(c.g, 0.0));
        assert!(close(c.b, 0.0));
        assert!(close(c.a, 128.0 / 255.0));
    }

    #[test]
    fn test_rgb_function_allows_spaces() {
        let c = Colour::parse("rgb(0, 255, 0)").unwrap();
        assert!(close(c.g, 1.0));
        assert!(close(c.a, 1.0));
    }

    #[test]
    fn test_rejects_invalid_colours() {
        for input in ["notacolour", "#12", "rgb(256,0,0)", "", "#1122334", "rgb(1,2)", "rgba(1,2,3,4,5)", "#gg0000"] {
            assert!(Colour::parse(input).is_err(), "{input} should be rejected");
        }
    }

    #[test]
    fn test_display_formats_as_hex() {
        assert_eq!(Colour::parse("rgb(17,34,51)").unwrap().to_string(), "#112233ff");
    }
}
