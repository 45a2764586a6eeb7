//! Per-output layer surface lifecycle

use smithay_client_toolkit::shell::wlr_layer::{Anchor, Layer};

use crate::config::{Dimensions, Edges, ExclusiveZone, OverlayConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfacePhase {
    Unrequested,
    PendingConfigure,
    Ready,
    Destroyed,
}

/// Static layer-surface parameters, sent once when the surface is requested
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceSetup {
    pub layer: Layer,
    pub anchor: Anchor,
    pub margins: Edges<i32>,
    pub size: Dimensions,
    pub exclusive_zone: i32,
    pub namespace: String,
    /// Install an empty input region so pointer input reaches the windows below
    pub input_passthrough: bool,
}

impl SurfaceSetup {
    pub fn new(config: &OverlayConfig, size: Dimensions) -> Self {
        Self {
            layer: config.layer,
            anchor: config.anchor,
            margins: config.margins,
            size,
            exclusive_zone: exclusive_zone(config.exclusive_zone, config.anchor, size),
            namespace: config.namespace.clone(),
            input_passthrough: !config.input,
        }
    }
}

/// Resolve the exclusive zone policy for a surface of `size` anchored at `anchor`
pub fn exclusive_zone(policy: ExclusiveZone, anchor: Anchor, size: Dimensions) -> i32 {
    match policy {
        ExclusiveZone::Auto if anchor == Anchor::TOP || anchor == Anchor::BOTTOM => {
            i32::try_from(size.height).unwrap_or(i32::MAX)
        }
        ExclusiveZone::Auto if anchor == Anchor::LEFT || anchor == Anchor::RIGHT => {
            i32::try_from(size.width).unwrap_or(i32::MAX)
        }
        ExclusiveZone::Auto | ExclusiveZone::Off => 0,
        ExclusiveZone::Fixed(value) => value,
    }
}

/// What a configure event asks of the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConfigureOutcome {
    /// This surface just left `PendingConfigure`
    pub first_ready: bool,
    pub render: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Surface {
    phase: SurfacePhase,
    dimensions: Dimensions,
    configured: bool,
    last_serial: Option<u32>,
}

impl Surface {
    pub fn new(dimensions: Dimensions) -> Self {
        Self {
            phase: SurfacePhase::Unrequested,
            dimensions,
            configured: false,
            last_serial: None,
        }
    }

    #[cfg(test)]
    pub fn phase(&self) -> SurfacePhase {
        self.phase
    }

    pub fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    pub fn is_configured(&self) -> bool {
        self.configured
    }

    pub fn last_serial(&self) -> Option<u32> {
        self.last_serial
    }

    /// Ask the compositor for placement. Only the first call has an effect.
    pub fn request(&mut self) -> bool {
        if self.phase != SurfacePhase::Unrequested {
            return false;
        }
        self.phase = SurfacePhase::PendingConfigure;
        true
    }

    /// Apply a size negotiation whose `serial` has already been acknowledged.
    ///
    /// A zero component leaves that axis to us, so the configured size is used.
    pub fn configure(
        &mut self,
        serial: u32,
        width: u32,
        height: u32,
        fallback: Dimensions,
    ) -> ConfigureOutcome {
        if !matches!(self.phase, SurfacePhase::PendingConfigure | SurfacePhase::Ready) {
            return ConfigureOutcome::default();
        }
        self.last_serial = Some(serial);

        let next = Dimensions {
            width: if width == 0 { fallback.width } else { width },
            height: if height == 0 { fallback.height } else { height },
        };
        let resized = next != self.dimensions;
        self.dimensions = next;

        let first_ready = self.phase == SurfacePhase::PendingConfigure;
        self.phase = SurfacePhase::Ready;
        self.configured = true;

        ConfigureOutcome {
            first_ready,
            render: first_ready || resized,
        }
    }

    /// Returns whether the surface was still alive
    pub fn destroy(&mut self) -> bool {
        if self.phase == SurfacePhase::Destroyed {
            return false;
        }
        self.phase = SurfacePhase::Destroyed;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    const SIZE: Dimensions = Dimensions { width: 320, height: 40 };

    #[test]
    fn test_exclusive_zone_auto_follows_anchor_axis() {
        let size = Dimensions::new(200, 40);
        assert_eq!(exclusive_zone(ExclusiveZone::Auto, Anchor::BOTTOM, size), 40);
        assert_eq!(exclusive_zone(ExclusiveZone::Auto, Anchor::TOP, size), 40);
        assert_eq!(exclusive_zone(ExclusiveZone::Auto, Anchor::LEFT, size), 200);
        assert_eq!(exclusive_zone(ExclusiveZone::Auto, Anchor::empty(), size), 0);
        assert_eq!(exclusive_zone(ExclusiveZone::Auto, Anchor::TOP | Anchor::LEFT, size), 0);
        assert_eq!(exclusive_zone(ExclusiveZone::Off, Anchor::BOTTOM, size), 0);
        assert_eq!(exclusive_zone(ExclusiveZone::Fixed(-1), Anchor::BOTTOM, size), -1);
    }

    #[test]
    fn test_setup_from_config() {
        let cli = crate::Cli::try_parse_from([
            "wayout", "--position", "bottom", "--exclusive-zone", "auto", "--height", "40", "--namespace", "clock",
        ])
        .unwrap();
        let config = OverlayConfig::from_cli(&cli).unwrap();
        let setup = SurfaceSetup::new(&config, config.size);
        assert_eq!(setup.exclusive_zone, 40);
        assert_eq!(setup.anchor, Anchor::BOTTOM);
        assert_eq!(setup.namespace, "clock");
        assert!(setup.input_passthrough);
    }

    #[test]
    fn test_lifecycle() {
        let mut surface = Surface::new(SIZE);
        assert_eq!(surface.phase(), SurfacePhase::Unrequested);
        assert!(surface.request());
        assert!(!surface.request());
        assert_eq!(surface.phase(), SurfacePhase::PendingConfigure);

        let outcome = surface.configure(7, 0, 0, SIZE);
        assert_eq!(outcome, ConfigureOutcome { first_ready: true, render: true });
        assert_eq!(surface.phase(), SurfacePhase::Ready);
        assert_eq!(surface.last_serial(), Some(7));

        // Same size again: nothing to repaint.
        let outcome = surface.configure(8, 320, 40, SIZE);
        assert_eq!(outcome, ConfigureOutcome::default());
        assert_eq!(surface.phase(), SurfacePhase::Ready);
    }

    #[test]
    fn test_resize_renders_without_leaving_ready() {
        let mut surface = Surface::new(SIZE);
        surface.request();
        surface.configure(1, 0, 0, SIZE);

        let outcome = surface.configure(2, 500, 0, SIZE);
        assert_eq!(outcome, ConfigureOutcome { first_ready: false, render: true });
        assert_eq!(surface.dimensions(), Dimensions::new(500, 40));
        assert!(surface.is_configured());
    }

    #[test]
    fn test_height_only_change_keeps_width() {
        let mut surface = Surface::new(SIZE);
        surface.request();
        surface.configure(1, 320, 40, SIZE);

        surface.configure(2, 320, 90, SIZE);
        assert_eq!(surface.dimensions(), Dimensions::new(320, 90));
    }

    #[test]
    fn test_destroy_is_idempotent_and_terminal() {
        let mut surface = Surface::new(SIZE);
        surface.request();
        assert!(surface.destroy());
        assert!(!surface.destroy());
        assert_eq!(surface.configure(3, 10, 10, SIZE), ConfigureOutcome::default());
        assert_eq!(surface.phase(), SurfacePhase::Destroyed);
        assert!(!surface.request());
    }
}
