//! Registry of known outputs and the surface each one may own

use tracing::{debug, info};

use super::surface::Surface;
use crate::config::{Dimensions, OutputFilter};

/// Side effect the Wayland glue must carry out for an output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    CreateSurface(u32),
    Render(u32),
    DestroySurface(u32),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Display {
    id: u32,
    scale: u32,
    name: Option<String>,
    surface: Option<Surface>,
}

impl Display {
    fn new(id: u32) -> Self {
        Self {
            id,
            scale: 1,
            name: None,
            surface: None,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn scale(&self) -> u32 {
        self.scale
    }

    #[cfg(test)]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn surface(&self) -> Option<&Surface> {
        self.surface.as_ref()
    }

    pub fn surface_mut(&mut self) -> Option<&mut Surface> {
        self.surface.as_mut()
    }

    /// Detach the surface after it was destroyed; a later name update may request a new one
    pub fn take_surface(&mut self) -> Option<Surface> {
        self.surface.take()
    }
}

#[derive(Debug)]
pub struct DisplayRegistry {
    displays: Vec<Display>,
    filter: OutputFilter,
    size: Dimensions,
    prerequisites_met: bool,
}

impl DisplayRegistry {
    pub fn new(filter: OutputFilter, size: Dimensions) -> Self {
        Self {
            displays: Vec::new(),
            filter,
            size,
            prerequisites_met: false,
        }
    }

    pub fn get(&self, id: u32) -> Option<&Display> {
        self.displays.iter().find(|display| display.id == id)
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut Display> {
        self.displays.iter_mut().find(|display| display.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Display> {
        self.displays.iter()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.displays.len()
    }

    pub fn register(&mut self, id: u32) {
        if self.get(id).is_none() {
            debug!(output = id, "registering output");
            self.displays.push(Display::new(id));
        }
    }

    pub fn resolve_name(&mut self, id: u32, name: &str) -> Option<Effect> {
        let ready = self.prerequisites_met;
        let size = self.size;
        let matches = self.filter.matches(name);
        let display = self.get_mut(id)?;

        if display.name.as_deref() != Some(name) {
            debug!(output = id, name, "output name resolved");
            display.name = Some(name.to_string());
        }

        if !matches {
            // Renamed away from the target output.
            let mut surface = display.surface.take()?;
            return surface.destroy().then_some(Effect::DestroySurface(id));
        }

        if ready {
            Self::request_surface(display, size)
        } else {
            None
        }
    }

    pub fn update_scale(&mut self, id: u32, scale: i32) -> Option<Effect> {
        let display = self.get_mut(id)?;
        let scale = u32::try_from(scale).unwrap_or(1).max(1);
        if display.scale == scale {
            return None;
        }
        debug!(output = id, scale, "output scale changed");
        display.scale = scale;
        display
            .surface
            .as_ref()
            .filter(|surface| surface.is_configured())
            .map(|_| Effect::Render(id))
    }

    pub fn remove(&mut self, id: u32) -> Option<Effect> {
        let index = self.displays.iter().position(|display| display.id == id)?;
        let mut display = self.displays.remove(index);
        info!(output = id, "output removed");
        display
            .surface
            .as_mut()
            .and_then(|surface| surface.destroy().then_some(Effect::DestroySurface(id)))
    }

    /// The globals surfaces depend on are bound; catch up on outputs named before that
    pub fn set_prerequisites_met(&mut self) -> Vec<Effect> {
        self.prerequisites_met = true;
        let size = self.size;
        let filter = &self.filter;
        self.displays
            .iter_mut()
            .filter(|display| display.name.as_deref().is_some_and(|name| filter.matches(name)))
            .filter_map(|display| Self::request_surface(display, size))
            .collect()
    }

    /// Drop every output, e.g. on shutdown
    pub fn clear(&mut self) -> Vec<Effect> {
        let ids: Vec<u32> = self.displays.iter().map(|display| display.id).collect();
        ids.into_iter().filter_map(|id| self.remove(id)).collect()
    }

    fn request_surface(target: &mut Display, size: Dimensions) -> Option<Effect> {
        if target.surface.is_some() {
            return None;
        }
        let mut surface = Surface::new(size);
        surface.request();
        target.surface = Some(surface);
        let (id, name) = (target.id, target.name.as_deref());
        info!(output = id, name = ?name, "requesting surface");
        Some(Effect::CreateSurface(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::surface::SurfacePhase;

    const SIZE: Dimensions = Dimensions { width: 100, height: 50 };

    fn registry(filter: OutputFilter) -> DisplayRegistry {
        let mut registry = DisplayRegistry::new(filter, SIZE);
        assert!(registry.set_prerequisites_met().is_empty());
        registry
    }

    #[test]
    fn test_target_filter_selects_named_output() {
        let mut registry = registry(OutputFilter::Named("DP-1".into()));
        registry.register(1);
        registry.register(2);
        assert_eq!(registry.resolve_name(1, "DP-1"), Some(Effect::CreateSurface(1)));
        assert_eq!(registry.resolve_name(2, "HDMI-1"), None);

        assert_eq!(registry.get(2).unwrap().name(), Some("HDMI-1"));
        assert!(registry.get(2).unwrap().surface().is_none());
        assert_eq!(
            registry.get(1).unwrap().surface().unwrap().phase(),
            SurfacePhase::PendingConfigure
        );
    }

    #[test]
    fn test_all_filter_gives_every_output_a_surface() {
        let mut registry = registry(OutputFilter::All);
        registry.register(1);
        registry.register(2);
        assert_eq!(registry.resolve_name(1, "DP-1"), Some(Effect::CreateSurface(1)));
        assert_eq!(registry.resolve_name(2, "HDMI-1"), Some(Effect::CreateSurface(2)));
        // A repeated name does not request a second surface.
        assert_eq!(registry.resolve_name(2, "HDMI-1"), None);
    }

    #[test]
    fn test_names_before_prerequisites_are_caught_up() {
        let mut registry = DisplayRegistry::new(OutputFilter::All, SIZE);
        registry.register(4);
        registry.register(5);
        assert_eq!(registry.resolve_name(4, "eDP-1"), None);
        assert_eq!(
            registry.set_prerequisites_met(),
            vec![Effect::CreateSurface(4)]
        );
        assert_eq!(registry.resolve_name(5, "DP-2"), Some(Effect::CreateSurface(5)));
    }

    #[test]
    fn test_scale_change_renders_existing_surface() {
        let mut registry = registry(OutputFilter::All);
        registry.register(1);
        assert_eq!(registry.update_scale(1, 2), None, "no surface yet");
        registry.resolve_name(1, "DP-1");
        let surface = registry.get_mut(1).unwrap().surface_mut().unwrap();
        surface.configure(1, 0, 0, SIZE);

        assert_eq!(registry.update_scale(1, 3), Some(Effect::Render(1)));
        assert_eq!(registry.update_scale(1, 3), None);
        assert_eq!(registry.get(1).unwrap().scale(), 3);
        assert_eq!(registry.update_scale(1, 0), Some(Effect::Render(1)));
        assert_eq!(registry.get(1).unwrap().scale(), 1);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut registry = registry(OutputFilter::All);
        registry.register(1);
        registry.resolve_name(1, "DP-1");
        assert_eq!(registry.remove(1), Some(Effect::DestroySurface(1)));
        assert_eq!(registry.remove(1), None);
        assert_eq!(registry.remove(99), None);
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_unknown_ids_are_ignored() {
        let mut registry = registry(OutputFilter::All);
        assert_eq!(registry.resolve_name(7, "DP-1"), None);
        assert_eq!(registry.update_scale(7, 2), None);
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_rename_away_from_target_destroys_surface() {
        let mut registry = registry(OutputFilter::Named("DP-1".into()));
        registry.register(1);
        registry.resolve_name(1, "DP-1");
        assert_eq!(registry.resolve_name(1, "DP-3"), Some(Effect::DestroySurface(1)));
        assert!(registry.get(1).unwrap().surface().is_none());
        assert_eq!(registry.resolve_name(1, "DP-4"), None, "already destroyed");
        assert_eq!(registry.remove(1), None);
    }

    #[test]
    fn test_renamed_back_gets_a_fresh_surface() {
        let mut registry = registry(OutputFilter::Named("DP-1".into()));
        registry.register(1);
        registry.resolve_name(1, "DP-1");
        registry.get_mut(1).unwrap().surface_mut().unwrap().configure(1, 0, 0, SIZE);
        registry.resolve_name(1, "DP-3");

        assert_eq!(registry.resolve_name(1, "DP-1"), Some(Effect::CreateSurface(1)));
        let surface = registry.get(1).unwrap().surface().unwrap();
        assert_eq!(surface.phase(), SurfacePhase::PendingConfigure);
        assert!(!surface.is_configured());
    }

    #[test]
    fn test_clear_destroys_all_surfaces() {
        let mut registry = registry(OutputFilter::All);
        for id in 1..=3 {
            registry.register(id);
        }
        registry.resolve_name(1, "A");
        registry.resolve_name(3, "C");
        assert_eq!(
            registry.clear(),
            vec![Effect::DestroySurface(1), Effect::DestroySurface(3)]
        );
        assert!(registry.clear().is_empty());
    }
}
