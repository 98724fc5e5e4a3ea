//! Chart surfaces.
//!
//! A render surface is an external resource bound to a container: created at
//! most once per container lifetime, released exactly once. The manager keeps
//! one [`lifecycle::SurfaceSlot`] per mounted container and routes every call
//! through [`lifecycle::apply_event`], so redundant option pushes and calls
//! on dead handles never reach the surface.

use std::collections::BTreeMap;

use serde_json::{json, Value};

use crate::logging::{log, log_surface, obj, v_str, Domain, Level};

pub mod binder;
pub mod lifecycle;
pub mod option;
pub mod text;

use lifecycle::{apply_event, Effect, SurfaceEvent, SurfaceSlot};
use option::option_hash;

pub use binder::{indicator_containers, portfolio_container, sync_charts};

pub trait RenderSurface {
    fn set_option(&mut self, option: &Value);
    fn resize(&mut self);
    fn release(&mut self);
}

pub trait SurfaceFactory {
    type Surface: RenderSurface;

    fn init(&mut self, container: &str) -> Self::Surface;
}

/// Names one container within one epoch. Handles from an earlier epoch of
/// the same container are inert.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChartHandle {
    container: String,
    epoch: u64,
}

impl ChartHandle {
    pub fn container(&self) -> &str {
        &self.container
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

struct Mounted<S> {
    slot: SurfaceSlot,
    surface: S,
}

pub struct ChartSurfaceManager<F: SurfaceFactory> {
    factory: F,
    mounted: BTreeMap<String, Mounted<F::Surface>>,
    next_epoch: u64,
}

impl<F: SurfaceFactory> ChartSurfaceManager<F> {
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            mounted: BTreeMap::new(),
            next_epoch: 0,
        }
    }

    /// Handle for `container`, creating its surface if not mounted.
    pub fn acquire(&mut self, container: &str) -> ChartHandle {
        if let Some(m) = self.mounted.get(container) {
            return ChartHandle {
                container: container.to_string(),
                epoch: m.slot.epoch,
            };
        }
        self.next_epoch += 1;
        let mut slot = SurfaceSlot::new(container.to_string(), self.next_epoch);
        if let Err(err) = apply_event(&mut slot, SurfaceEvent::Init) {
            self.reject(&slot, &err.msg);
        }
        let surface = self.factory.init(container);
        log_surface("surface_init", container, slot.epoch);
        let handle = ChartHandle {
            container: container.to_string(),
            epoch: slot.epoch,
        };
        self.mounted
            .insert(container.to_string(), Mounted { slot, surface });
        handle
    }

    /// Push `option` unless it equals the last applied one. Returns whether
    /// the surface was touched.
    pub fn update(&mut self, handle: &ChartHandle, option: &Value) -> bool {
        let hash = option_hash(option);
        self.drive(handle, SurfaceEvent::Update { hash }, |s| s.set_option(option))
    }

    pub fn resize(&mut self, handle: &ChartHandle) -> bool {
        self.drive(handle, SurfaceEvent::Resize, |s| s.resize())
    }

    pub fn resize_all(&mut self) {
        let handles = self.handles();
        for handle in &handles {
            self.resize(handle);
        }
    }

    /// Release the surface and forget the container. Later calls with this
    /// handle are no-ops.
    pub fn dispose(&mut self, handle: &ChartHandle) -> bool {
        let released = self.drive(handle, SurfaceEvent::Dispose, |s| s.release());
        if released {
            self.mounted.remove(&handle.container);
            log_surface("surface_disposed", &handle.container, handle.epoch);
        }
        released
    }

    pub fn dispose_all(&mut self) {
        let handles = self.handles();
        for handle in &handles {
            self.dispose(handle);
        }
    }

    pub fn handles(&self) -> Vec<ChartHandle> {
        self.mounted
            .iter()
            .map(|(container, m)| ChartHandle {
                container: container.clone(),
                epoch: m.slot.epoch,
            })
            .collect()
    }

    pub fn is_mounted(&self, container: &str) -> bool {
        self.mounted.contains_key(container)
    }

    pub fn surface(&self, handle: &ChartHandle) -> Option<&F::Surface> {
        self.mounted
            .get(&handle.container)
            .filter(|m| m.slot.epoch == handle.epoch)
            .map(|m| &m.surface)
    }

    fn drive(
        &mut self,
        handle: &ChartHandle,
        event: SurfaceEvent,
        effect: impl FnOnce(&mut F::Surface),
    ) -> bool {
        let Some(m) = self
            .mounted
            .get_mut(&handle.container)
            .filter(|m| m.slot.epoch == handle.epoch)
        else {
            return false;
        };
        match apply_event(&mut m.slot, event) {
            Ok(Effect::Apply) | Ok(Effect::Resize) | Ok(Effect::Release) => {
                effect(&mut m.surface);
                true
            }
            Ok(_) => false,
            Err(err) => {
                log(
                    Level::Error,
                    Domain::Chart,
                    "surface_transition",
                    obj(&[
                        ("container", v_str(&handle.container)),
                        ("epoch", json!(handle.epoch)),
                        ("msg", v_str(&err.msg)),
                    ]),
                );
                false
            }
        }
    }

    fn reject(&self, slot: &SurfaceSlot, msg: &str) {
        log(
            Level::Error,
            Domain::Chart,
            "surface_transition",
            obj(&[
                ("container", v_str(&slot.container)),
                ("epoch", json!(slot.epoch)),
                ("msg", v_str(msg)),
            ]),
        );
    }
}

impl<F: SurfaceFactory> Drop for ChartSurfaceManager<F> {
    fn drop(&mut self) {
        self.dispose_all();
    }
}
