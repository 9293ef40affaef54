//! In-progress planning chain used for circular dependency detection

use std::ops::{Deref, DerefMut};

use crate::error::{DIError, DIResult};
use crate::key::LookupKey;
use crate::service_type::ServiceType;

#[derive(Debug)]
struct Frame {
    key: LookupKey,
    implementation: Option<ServiceType>,
}

impl Frame {
    fn render(&self) -> String {
        match &self.implementation {
            Some(implementation) if implementation != self.key.service_type() => {
                format!("{}({implementation})", self.key)
            }
            _ => self.key.to_string(),
        }
    }
}

/// Keys currently being planned on this call stack, in entry order
#[derive(Debug, Default)]
pub(crate) struct ResolutionChain {
    frames: Vec<Frame>,
}

impl ResolutionChain {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn len(&self) -> usize {
        self.frames.len()
    }

    /// Fail if `key` is already being planned
    pub(crate) fn check(&self, key: &LookupKey) -> DIResult<()> {
        let Some(existing) = self.frames.iter().find(|f| &f.key == key) else {
            return Ok(());
        };

        let detail = match &existing.implementation {
            Some(implementation) if implementation != key.service_type() => {
                format!(" (resolved as {} via {implementation})", key.service_type())
            }
            _ => String::new(),
        };

        let mut path: Vec<String> = self.frames.iter().map(Frame::render).collect();
        path.push(key.to_string());

        Err(DIError::CircularDependency {
            service: key.to_string(),
            detail,
            path: path.join(" -> "),
        })
    }

    /// Push a frame that is popped when the guard drops
    pub(crate) fn enter(&mut self, key: LookupKey, implementation: Option<ServiceType>) -> ChainGuard<'_> {
        self.frames.push(Frame { key, implementation });
        ChainGuard { chain: self }
    }
}

/// Pops its frame on drop, on success and failure alike
pub(crate) struct ChainGuard<'a> {
    chain: &'a mut ResolutionChain,
}

impl Deref for ChainGuard<'_> {
    type Target = ResolutionChain;

    fn deref(&self) -> &Self::Target {
        self.chain
    }
}

impl DerefMut for ChainGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.chain
    }
}

impl Drop for ChainGuard<'_> {
    fn drop(&mut self) {
        self.chain.frames.pop();
    }
}
