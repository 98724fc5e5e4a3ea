#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceState {
    Uninitialized,
    Active,
    Disposed,
}

/// Bookkeeping for one container's surface within one epoch.
#[derive(Debug, Clone)]
pub struct SurfaceSlot {
    pub container: String,
    pub epoch: u64,
    pub state: SurfaceState,
    pub last_applied_hash: Option<String>,
}

impl SurfaceSlot {
    pub fn new(container: String, epoch: u64) -> Self {
        Self {
            container,
            epoch,
            state: SurfaceState::Uninitialized,
            last_applied_hash: None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum SurfaceEvent {
    Init,
    Update { hash: String },
    Resize,
    Dispose,
}

/// What the caller must do to the underlying surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Create,
    Apply,
    Resize,
    Release,
    Skip,
}

#[derive(Debug, Clone)]
pub struct TransitionError {
    pub msg: String,
}

pub fn apply_event(slot: &mut SurfaceSlot, event: SurfaceEvent) -> Result<Effect, TransitionError> {
    match (&slot.state, event) {
        (SurfaceState::Uninitialized, SurfaceEvent::Init) => {
            slot.state = SurfaceState::Active;
            Ok(Effect::Create)
        }
        (SurfaceState::Uninitialized, SurfaceEvent::Dispose) => {
            slot.state = SurfaceState::Disposed;
            Ok(Effect::Skip)
        }
        (SurfaceState::Uninitialized, _) => Err(TransitionError {
            msg: format!("surface {} not initialized", slot.container),
        }),
        (SurfaceState::Active, SurfaceEvent::Update { hash }) => {
            if slot.last_applied_hash.as_deref() == Some(hash.as_str()) {
                return Ok(Effect::Skip);
            }
            slot.last_applied_hash = Some(hash);
            Ok(Effect::Apply)
        }
        (SurfaceState::Active, SurfaceEvent::Resize) => Ok(Effect::Resize),
        (SurfaceState::Active, SurfaceEvent::Dispose) => {
            slot.state = SurfaceState::Disposed;
            slot.last_applied_hash = None;
            Ok(Effect::Release)
        }
        (SurfaceState::Active, SurfaceEvent::Init)
        | (SurfaceState::Disposed, SurfaceEvent::Init) => {
            Err(TransitionError {
                msg: format!(
                    "surface {} epoch {} cannot be initialized twice",
                    slot.container, slot.epoch
                ),
            })
        }
        (SurfaceState::Disposed, _) => Ok(Effect::Skip),
    }
}
