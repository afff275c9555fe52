use anyhow::{bail, Result};
use std::collections::HashMap;

/// Usage state of a tracked frame resource.
///
/// wgpu inserts the hardware barriers itself; the tracker exists to enforce that the
/// frame loop moves every resource through the same state sequence an explicit API
/// would require, and to make that sequence observable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceState {
    Present,
    RenderTarget,
    DepthWrite,
    ShaderRead,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceId {
    SwapImage(u32),
    Depth,
    ShadowMap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub resource: ResourceId,
    pub before: ResourceState,
    pub after: ResourceState,
}

#[derive(Debug, Default)]
pub struct BarrierTracker {
    states: HashMap<ResourceId, ResourceState>,
    log: Vec<Transition>,
}

impl BarrierTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a resource and its resting state. Re-registering resets the state,
    /// which is what a resize does.
    pub fn register(&mut self, resource: ResourceId, state: ResourceState) {
        self.states.insert(resource, state);
    }

    pub fn forget(&mut self, resource: ResourceId) {
        self.states.remove(&resource);
    }

    pub fn state(&self, resource: ResourceId) -> Option<ResourceState> {
        self.states.get(&resource).copied()
    }

    /// Records `before -> after`. Fails if the resource is unknown, is not currently
    /// in `before`, or the pair is not a legal transition.
    pub fn transition(&mut self, resource: ResourceId, before: ResourceState, after: ResourceState) -> Result<()> {
        let Some(current) = self.states.get_mut(&resource) else {
            bail!("transition on untracked resource {resource:?}");
        };
        if *current != before {
            bail!("{resource:?} is in {current:?}, expected {before:?} before moving to {after:?}");
        }
        if !is_legal(resource, before, after) {
            bail!("illegal transition {before:?} -> {after:?} for {resource:?}");
        }
        *current = after;
        self.log.push(Transition { resource, before, after });
        Ok(())
    }

    /// Transitions recorded since the last `take_log` or `clear_log`.
    pub fn log(&self) -> &[Transition] {
        &self.log
    }

    pub fn clear_log(&mut self) {
        self.log.clear();
    }

    pub fn take_log(&mut self) -> Vec<Transition> {
        std::mem::take(&mut self.log)
    }
}

fn is_legal(resource: ResourceId, before: ResourceState, after: ResourceState) -> bool {
    use ResourceState::*;
    match resource {
        ResourceId::SwapImage(_) => matches!((before, after), (Present, RenderTarget) | (RenderTarget, Present)),
        ResourceId::Depth => matches!((before, after), (DepthWrite, ShaderRead) | (ShaderRead, DepthWrite)),
        ResourceId::ShadowMap => matches!((before, after), (ShaderRead, DepthWrite) | (DepthWrite, ShaderRead)),
    }
}
