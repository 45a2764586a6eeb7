//! Overlay state machine
//!
//! Protocol callbacks are decoded into [`ProtocolEvent`]s and applied here.
//! Nothing in this module talks to the compositor: every side effect comes
//! back as an [`Effect`] for the Wayland glue to carry out.

use tracing::{debug, info, trace};

use super::display::{DisplayRegistry, Effect};
use crate::config::{Dimensions, OutputFilter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolEvent {
    OutputAnnounced {
        id: u32,
        name: Option<String>,
        scale: i32,
    },
    OutputUpdated {
        id: u32,
        name: Option<String>,
        scale: i32,
    },
    OutputRemoved {
        id: u32,
    },
    Configure {
        id: u32,
        serial: u32,
        width: u32,
        height: u32,
    },
    Closed {
        id: u32,
    },
}

#[derive(Debug)]
pub struct OverlayModel {
    registry: DisplayRegistry,
    size: Dimensions,
    ready: bool,
}

impl OverlayModel {
    pub fn new(filter: OutputFilter, size: Dimensions) -> Self {
        Self {
            registry: DisplayRegistry::new(filter, size),
            size,
            ready: false,
        }
    }

    pub fn registry(&self) -> &DisplayRegistry {
        &self.registry
    }

    /// True once any surface has completed its first configure
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn set_prerequisites_met(&mut self) -> Vec<Effect> {
        self.registry.set_prerequisites_met()
    }

    pub fn handle(&mut self, event: ProtocolEvent) -> Vec<Effect> {
        match event {
            ProtocolEvent::OutputAnnounced { id, name, scale }
            | ProtocolEvent::OutputUpdated { id, name, scale } => {
                self.registry.register(id);
                let mut effects = Vec::new();
                effects.extend(self.registry.update_scale(id, scale));
                if let Some(name) = name {
                    effects.extend(self.registry.resolve_name(id, &name));
                }
                // A fresh surface renders after its first configure.
                if effects.contains(&Effect::CreateSurface(id)) {
                    effects.retain(|effect| *effect != Effect::Render(id));
                }
                effects
            }
            ProtocolEvent::OutputRemoved { id } => self.registry.remove(id).into_iter().collect(),
            ProtocolEvent::Configure {
                id,
                serial,
                width,
                height,
            } => self.configure(id, serial, width, height),
            ProtocolEvent::Closed { id } => self.closed(id),
        }
    }

    /// Surfaces that can be drawn right now
    pub fn renderable(&self) -> Vec<u32> {
        self.registry
            .iter()
            .filter(|display| display.surface().is_some_and(|surface| surface.is_configured()))
            .map(|display| display.id())
            .collect()
    }

    pub fn shutdown(&mut self) -> Vec<Effect> {
        self.registry.clear()
    }

    fn configure(&mut self, id: u32, serial: u32, width: u32, height: u32) -> Vec<Effect> {
        let size = self.size;
        let Some(surface) = self
            .registry
            .get_mut(id)
            .and_then(|display| display.surface_mut())
        else {
            debug!(output = id, "configure for unknown surface");
            return Vec::new();
        };

        trace!(output = id, serial, previous = ?surface.last_serial(), "applying configure");
        let outcome = surface.configure(serial, width, height, size);
        if outcome.first_ready && !self.ready {
            info!(output = id, "first surface ready");
            self.ready = true;
        }
        if outcome.render {
            vec![Effect::Render(id)]
        } else {
            Vec::new()
        }
    }

    fn closed(&mut self, id: u32) -> Vec<Effect> {
        let Some(display) = self.registry.get_mut(id) else {
            return Vec::new();
        };
        info!(output = id, "surface closed by compositor");
        match display.take_surface() {
            Some(mut surface) => surface
                .destroy()
                .then_some(Effect::DestroySurface(id))
                .into_iter()
                .collect(),
            None => Vec::new(),
        }
    }
}
