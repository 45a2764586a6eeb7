//! Wayland layer-shell integration

use smithay_client_toolkit::{
    compositor::{CompositorHandler, CompositorState, Region},
    delegate_compositor, delegate_layer, delegate_output, delegate_registry, delegate_shm,
    output::{OutputHandler, OutputState},
    registry::{ProvidesRegistryState, RegistryState},
    registry_handlers,
    shell::{
        WaylandSurface,
        wlr_layer::{
            KeyboardInteractivity, LayerShell, LayerShellHandler, LayerSurface,
            LayerSurfaceConfigure,
        },
    },
    shm::{Shm, ShmHandler},
};
use std::collections::HashMap;
use tracing::{debug, error, info, warn};
use wayland_client::{
    Connection, Dispatch, Proxy, QueueHandle,
    globals::GlobalList,
    protocol::{wl_buffer, wl_output, wl_surface},
};

use super::OverlayError;
use super::buffer::{BufferPool, BufferTag, ShmBacking};
use super::display::Effect;
use super::render::{Renderer, copy_to_argb};
use super::state::{OverlayModel, ProtocolEvent};
use super::surface::SurfaceSetup;
use crate::config::OverlayConfig;
use crate::feed::{FeedMode, clock_text};

/// A requested layer surface and its buffers
struct LiveSurface {
    layer: LayerSurface,
    pool: BufferPool<ShmBacking>,
}

/// Main overlay application state
pub struct OverlayApp {
    registry_state: RegistryState,
    output_state: OutputState,
    compositor_state: CompositorState,
    shm: Shm,
    layer_shell: LayerShell,

    config: OverlayConfig,
    model: OverlayModel,
    renderer: Renderer,
    outputs: HashMap<u32, wl_output::WlOutput>,
    surfaces: HashMap<u32, LiveSurface>,
    text: String,
}

impl OverlayApp {
    pub fn new(
        globals: &GlobalList,
        qh: &QueueHandle<Self>,
        config: OverlayConfig,
        renderer: Renderer,
    ) -> Result<Self, OverlayError> {
        let registry_state = RegistryState::new(globals);
        let output_state = OutputState::new(globals, qh);
        let compositor_state =
            CompositorState::bind(globals, qh).map_err(|source| OverlayError::Capability {
                global: "wl_compositor",
                source,
            })?;
        let shm = Shm::bind(globals, qh).map_err(|source| OverlayError::Capability {
            global: "wl_shm",
            source,
        })?;
        let layer_shell =
            LayerShell::bind(globals, qh).map_err(|source| OverlayError::Capability {
                global: "zwlr_layer_shell_v1",
                source,
            })?;

        let text = match config.feed {
            FeedMode::Clock => clock_text(),
            _ => String::new(),
        };

        Ok(Self {
            registry_state,
            output_state,
            compositor_state,
            shm,
            layer_shell,
            model: OverlayModel::new(config.output.clone(), config.size),
            config,
            renderer,
            outputs: HashMap::new(),
            surfaces: HashMap::new(),
            text,
        })
    }

    pub fn is_ready(&self) -> bool {
        self.model.is_ready()
    }

    /// Globals are bound: request surfaces for outputs seen so far
    pub fn start(&mut self, qh: &QueueHandle<Self>) {
        let effects = self.model.set_prerequisites_met();
        self.apply(qh, effects);
    }

    pub fn set_text(&mut self, text: String) {
        self.text = text;
    }

    /// Repaint every configured surface
    pub fn redraw_all(&mut self, qh: &QueueHandle<Self>) {
        if self.config.feed == FeedMode::Clock {
            self.text = clock_text();
        }
        for id in self.model.renderable() {
            self.render(qh, id);
        }
    }

    /// Destroy all surfaces and their buffers
    pub fn shutdown(&mut self, qh: &QueueHandle<Self>) {
        let effects = self.model.shutdown();
        self.apply(qh, effects);
        // Surfaces of outputs the model no longer tracks
        self.surfaces.clear();
        self.outputs.clear();
    }

    fn handle(&mut self, qh: &QueueHandle<Self>, event: ProtocolEvent) {
        let effects = self.model.handle(event);
        self.apply(qh, effects);
    }

    fn apply(&mut self, qh: &QueueHandle<Self>, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::CreateSurface(id) => self.create_surface(qh, id),
                Effect::Render(id) => self.render(qh, id),
                Effect::DestroySurface(id) => {
                    if let Some(mut live) = self.surfaces.remove(&id) {
                        live.pool.clear();
                        info!(output = id, "surface destroyed");
                    }
                }
            }
        }
    }

    fn create_surface(&mut self, qh: &QueueHandle<Self>, id: u32) {
        let Some(output) = self.outputs.get(&id) else {
            warn!(output = id, "no wl_output for surface request");
            return;
        };
        let setup = SurfaceSetup::new(&self.config, self.config.size);
        let surface = self.compositor_state.create_surface(qh);

        let layer = self.layer_shell.create_layer_surface(
            qh,
            surface,
            setup.layer,
            Some(setup.namespace.clone()),
            Some(output),
        );

        layer.set_anchor(setup.anchor);
        layer.set_keyboard_interactivity(KeyboardInteractivity::None);
        layer.set_size(setup.size.width, setup.size.height);
        layer.set_margin(
            setup.margins.top,
            setup.margins.right,
            setup.margins.bottom,
            setup.margins.left,
        );
        layer.set_exclusive_zone(setup.exclusive_zone);

        if setup.input_passthrough {
            match Region::new(&self.compositor_state) {
                Ok(region) => layer.set_input_region(Some(region.wl_region())),
                Err(e) => warn!(output = id, "failed to create input region: {}", e),
            }
        }

        // Commit initial configuration
        layer.wl_surface().commit();
        debug!(output = id, ?setup, "layer surface requested");

        self.surfaces.insert(
            id,
            LiveSurface {
                layer,
                pool: BufferPool::new(),
            },
        );
    }

    fn render(&mut self, qh: &QueueHandle<Self>, id: u32) {
        let Some(display) = self.model.registry().get(id) else {
            return;
        };
        let Some(size) = display.surface().map(|surface| surface.dimensions()) else {
            return;
        };
        let scale = display.scale();
        let Some(live) = self.surfaces.get_mut(&id) else {
            return;
        };

        let scaled = size.scaled(scale);
        let shm = &self.shm;
        let buffer = match live.pool.acquire(scaled.width, scaled.height, |width, height, key| {
            ShmBacking::new(shm, qh, BufferTag { output: id, key }, width, height)
        }) {
            Ok(Some(buffer)) => buffer,
            Ok(None) => {
                debug!(output = id, "both buffers busy, dropping frame");
                return;
            }
            Err(e) => {
                error!(output = id, "buffer allocation failed: {}", e);
                return;
            }
        };

        let Some(mut pixmap) = tiny_skia::Pixmap::new(scaled.width, scaled.height) else {
            error!(output = id, "failed to create pixmap");
            let key = buffer.key();
            live.pool.release(key);
            return;
        };
        if let Err(e) = self.renderer.render(&mut pixmap, size, scale, &self.text) {
            error!(output = id, "render failed: {}", e);
        }
        copy_to_argb(&pixmap, buffer.canvas());

        let surface = live.layer.wl_surface();
        surface.set_buffer_scale(i32::try_from(scale).unwrap_or(1));
        surface.damage_buffer(0, 0, i32::MAX, i32::MAX);
        surface.attach(Some(buffer.backing().wl_buffer()), 0, 0);
        surface.commit();
    }

    fn output_id(output: &wl_output::WlOutput) -> u32 {
        output.id().protocol_id()
    }

    fn output_event(&mut self, qh: &QueueHandle<Self>, output: wl_output::WlOutput, announced: bool) {
        let id = Self::output_id(&output);
        let (name, scale) = match self.output_state.info(&output) {
            Some(info) => (info.name, info.scale_factor),
            None => (None, 1),
        };
        self.outputs.insert(id, output);
        let event = if announced {
            ProtocolEvent::OutputAnnounced { id, name, scale }
        } else {
            ProtocolEvent::OutputUpdated { id, name, scale }
        };
        self.handle(qh, event);
    }

    fn layer_id(&self, layer: &LayerSurface) -> Option<u32> {
        self.surfaces
            .iter()
            .find(|(_, live)| live.layer.wl_surface() == layer.wl_surface())
            .map(|(id, _)| *id)
    }
}

delegate_compositor!(OverlayApp);
delegate_output!(OverlayApp);
delegate_shm!(OverlayApp);
delegate_layer!(OverlayApp);
delegate_registry!(OverlayApp);

impl CompositorHandler for OverlayApp {
    fn scale_factor_changed(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        _new_factor: i32,
    ) {
        // Scale follows the output, see `update_output`
    }

    fn frame(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        _time: u32,
    ) {
    }

    fn transform_changed(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        _new_transform: wl_output::Transform,
    ) {
    }

    fn surface_enter(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        _output: &wl_output::WlOutput,
    ) {
    }

    fn surface_leave(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        _output: &wl_output::WlOutput,
    ) {
    }
}

impl OutputHandler for OverlayApp {
    fn output_state(&mut self) -> &mut OutputState {
        &mut self.output_state
    }

    fn new_output(&mut self, _conn: &Connection, qh: &QueueHandle<Self>, output: wl_output::WlOutput) {
        self.output_event(qh, output, true);
    }

    fn update_output(
        &mut self,
        _conn: &Connection,
        qh: &QueueHandle<Self>,
        output: wl_output::WlOutput,
    ) {
        self.output_event(qh, output, false);
    }

    fn output_destroyed(
        &mut self,
        _conn: &Connection,
        qh: &QueueHandle<Self>,
        output: wl_output::WlOutput,
    ) {
        let id = Self::output_id(&output);
        self.handle(qh, ProtocolEvent::OutputRemoved { id });
        // The model only reports surfaces it still tracked.
        self.surfaces.remove(&id);
        self.outputs.remove(&id);
    }
}

impl LayerShellHandler for OverlayApp {
    fn closed(&mut self, _conn: &Connection, qh: &QueueHandle<Self>, layer: &LayerSurface) {
        if let Some(id) = self.layer_id(layer) {
            self.handle(qh, ProtocolEvent::Closed { id });
        }
    }

    fn configure(
        &mut self,
        _conn: &Connection,
        qh: &QueueHandle<Self>,
        layer: &LayerSurface,
        configure: LayerSurfaceConfigure,
        serial: u32,
    ) {
        let Some(id) = self.layer_id(layer) else {
            return;
        };
        let (width, height) = configure.new_size;
        debug!(output = id, serial, width, height, "configure");
        self.handle(
            qh,
            ProtocolEvent::Configure {
                id,
                serial,
                width,
                height,
            },
        );
    }
}

impl ShmHandler for OverlayApp {
    fn shm_state(&mut self) -> &mut Shm {
        &mut self.shm
    }
}

impl Dispatch<wl_buffer::WlBuffer, BufferTag> for OverlayApp {
    fn event(
        state: &mut Self,
        _proxy: &wl_buffer::WlBuffer,
        event: wl_buffer::Event,
        tag: &BufferTag,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        if let wl_buffer::Event::Release = event {
            if let Some(live) = state.surfaces.get_mut(&tag.output) {
                live.pool.release(tag.key);
            }
        }
    }
}

impl ProvidesRegistryState for OverlayApp {
    fn registry(&mut self) -> &mut RegistryState {
        &mut self.registry_state
    }
    registry_handlers![OutputState];
}
