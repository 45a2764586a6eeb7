//! Immutable configuration snapshot built from the command line

use smithay_client_toolkit::shell::wlr_layer::{Anchor, Layer};
use std::time::Duration;
use thiserror::Error;

use crate::Cli;
use crate::colour::Colour;
use crate::feed::FeedMode;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("font pattern may not be empty")]
    EmptyFont,
    #[error("unrecognized text alignment \"{0}\" (expected 'left' or 'center')")]
    TextAlign(String),
    #[error("unrecognized exclusive zone option \"{0}\" (expected true, false, stationary or a number)")]
    ExclusiveZone(String),
}

/// Logical size of a surface, borders included
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn scaled(self, scale: u32) -> Self {
        Self {
            width: self.width.saturating_mul(scale),
            height: self.height.saturating_mul(scale),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Edges<T> {
    pub top: T,
    pub right: T,
    pub bottom: T,
    pub left: T,
}

impl<T: Copy> Edges<T> {
    pub fn uniform(value: T) -> Self {
        Self {
            top: value,
            right: value,
            bottom: value,
            left: value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Corners<T> {
    pub top_left: T,
    pub top_right: T,
    pub bottom_right: T,
    pub bottom_left: T,
}

impl<T: Copy> Corners<T> {
    pub fn uniform(value: T) -> Self {
        Self {
            top_left: value,
            top_right: value,
            bottom_right: value,
            bottom_left: value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExclusiveZone {
    /// Reserve the surface's extent along the anchored axis
    Auto,
    Off,
    Fixed(i32),
}

impl ExclusiveZone {
    pub fn parse(input: &str) -> Result<Self, ConfigError> {
        match input {
            "true" | "yes" | "on" | "1" | "auto" => Ok(Self::Auto),
            "false" | "no" | "off" | "0" => Ok(Self::Off),
            "stationary" => Ok(Self::Fixed(-1)),
            other => other
                .parse()
                .map(Self::Fixed)
                .map_err(|_| ConfigError::ExclusiveZone(other.to_string())),
        }
    }
}

/// Which outputs receive a surface
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputFilter {
    All,
    Named(String),
}

impl OutputFilter {
    pub fn from_arg(arg: Option<&str>) -> Self {
        match arg {
            None | Some("all") | Some("*") => Self::All,
            Some(name) => Self::Named(name.to_string()),
        }
    }

    pub fn matches(&self, name: &str) -> bool {
        match self {
            Self::All => true,
            Self::Named(target) => target == name,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Position {
    Center,
    Top,
    Right,
    Bottom,
    Left,
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl Position {
    pub fn anchor(self) -> Anchor {
        match self {
            Position::Center => Anchor::empty(),
            Position::Top => Anchor::TOP,
            Position::Right => Anchor::RIGHT,
            Position::Bottom => Anchor::BOTTOM,
            Position::Left => Anchor::LEFT,
            Position::TopLeft => Anchor::TOP | Anchor::LEFT,
            Position::TopRight => Anchor::TOP | Anchor::RIGHT,
            Position::BottomLeft => Anchor::BOTTOM | Anchor::LEFT,
            Position::BottomRight => Anchor::BOTTOM | Anchor::RIGHT,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LayerArg {
    Overlay,
    Top,
    Bottom,
    Background,
}

impl From<LayerArg> for Layer {
    fn from(layer: LayerArg) -> Self {
        match layer {
            LayerArg::Overlay => Layer::Overlay,
            LayerArg::Top => Layer::Top,
            LayerArg::Bottom => Layer::Bottom,
            LayerArg::Background => Layer::Background,
        }
    }
}

/// Everything the renderer needs besides the text and the surface size
#[derive(Debug, Clone, PartialEq)]
pub struct Style {
    pub background: Colour,
    pub border: Colour,
    pub text: Colour,
    pub borders: Edges<u32>,
    pub radii: Corners<u32>,
    pub font: String,
    pub center: bool,
    pub wrap: bool,
}

#[derive(Debug, Clone)]
pub struct OverlayConfig {
    pub size: Dimensions,
    pub layer: Layer,
    pub anchor: Anchor,
    pub margins: Edges<i32>,
    pub exclusive_zone: ExclusiveZone,
    pub namespace: String,
    pub output: OutputFilter,
    /// Receive pointer input instead of letting it pass through
    pub input: bool,
    pub style: Style,
    pub feed: FeedMode,
    pub interval: Duration,
}

impl OverlayConfig {
    pub fn from_cli(cli: &Cli) -> Result<Self, ConfigError> {
        let margin = Edges::uniform(cli.margin.unwrap_or(0));
        let margins = Edges {
            top: cli.margin_top.unwrap_or(margin.top),
            right: cli.margin_right.unwrap_or(margin.right),
            bottom: cli.margin_bottom.unwrap_or(margin.bottom),
            left: cli.margin_left.unwrap_or(margin.left),
        };

        let border = Edges::uniform(cli.border_size.unwrap_or(0));
        let borders = Edges {
            top: cli.border_top.unwrap_or(border.top),
            right: cli.border_right.unwrap_or(border.right),
            bottom: cli.border_bottom.unwrap_or(border.bottom),
            left: cli.border_left.unwrap_or(border.left),
        };

        let radius = Corners::uniform(cli.corner_radius.unwrap_or(0));
        let radii = Corners {
            top_left: cli.radius_top_left.unwrap_or(radius.top_left),
            top_right: cli.radius_top_right.unwrap_or(radius.top_right),
            bottom_right: cli.radius_bottom_right.unwrap_or(radius.bottom_right),
            bottom_left: cli.radius_bottom_left.unwrap_or(radius.bottom_left),
        };

        let mut font = cli.font.trim().to_string();
        if let Some(size) = &cli.fontsize {
            font = format!("{font} {size}");
        }
        if font.is_empty() {
            return Err(ConfigError::EmptyFont);
        }

        let center = match cli.textalign.as_deref() {
            None | Some("left") => cli.center,
            Some("center") => true,
            Some(other) => return Err(ConfigError::TextAlign(other.to_string())),
        };

        let feed = if cli.feed_line {
            FeedMode::Line
        } else if cli.feed_par {
            FeedMode::Delimited(String::new())
        } else if let Some(token) = &cli.feed_delimiter {
            if token.is_empty() {
                FeedMode::Line
            } else {
                FeedMode::Delimited(token.clone())
            }
        } else {
            FeedMode::Clock
        };

        Ok(Self {
            size: Dimensions::new(cli.width, cli.height),
            layer: cli.layer.into(),
            anchor: cli.position.anchor(),
            margins,
            exclusive_zone: cli.exclusive_zone,
            namespace: cli.namespace.clone(),
            output: OutputFilter::from_arg(cli.output.as_deref()),
            input: cli.input,
            style: Style {
                background: cli.background_colour,
                border: cli.border_colour,
                text: cli.text_colour,
                borders,
                radii,
                font,
                center,
                wrap: !cli.no_wrap,
            },
            feed,
            interval: Duration::from_millis(cli.interval),
        })
    }
}
