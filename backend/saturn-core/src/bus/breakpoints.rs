//! Memory breakpoint hooks layered over the page table
//!
//! Each installed breakpoint contributes a hook to its page. A page is watched while any hook
//! remains on it; removing the last hook returns the page to its direct handler.

use crate::bus::pages::{PageMap, page_of};
use sh2_emu::WhichCpu;
use sh2_emu::debug::MemoryAccessFlags;

// Breakpoint addresses ignore the cache-area bits
const ADDRESS_MASK: u32 = 0x0FFFFFFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hook {
    pub cpu: WhichCpu,
    pub address: u32,
    pub flags: MemoryAccessFlags,
}

#[derive(Debug, Clone, Default)]
pub struct BreakpointHooks {
    hooks: Vec<Hook>,
    in_breakpoint: bool,
}

impl BreakpointHooks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn hooks(&self) -> &[Hook] {
        &self.hooks
    }

    pub fn install(&mut self, hook: Hook, pages: &mut PageMap) {
        let hook = Hook { address: hook.address & ADDRESS_MASK, ..hook };
        self.hooks.push(hook);
        pages.set_watched(page_of(hook.address), true);
    }

    /// Remove `cpu`'s hook at `address`. The page stays watched if other hooks share it.
    pub fn remove(&mut self, cpu: WhichCpu, address: u32, pages: &mut PageMap) -> Option<Hook> {
        let address = address & ADDRESS_MASK;
        let index =
            self.hooks.iter().position(|hook| hook.cpu == cpu && hook.address == address)?;
        let hook = self.hooks.remove(index);

        let page = page_of(address);
        let still_watched = self.hooks.iter().any(|hook| page_of(hook.address) == page);
        pages.set_watched(page, still_watched);

        Some(hook)
    }

    pub fn clear(&mut self, pages: &mut PageMap) {
        for hook in self.hooks.drain(..) {
            pages.set_watched(page_of(hook.address), false);
        }
    }

    /// Hook of `cpu` matching an access, if any. Never matches while a breakpoint is being
    /// handled.
    #[must_use]
    pub fn check(&self, cpu: WhichCpu, address: u32, access: MemoryAccessFlags) -> Option<Hook> {
        if self.in_breakpoint {
            return None;
        }

        let address = address & ADDRESS_MASK;
        self.hooks.iter().copied().find(|hook| {
            hook.cpu == cpu && hook.address == address && hook.flags.intersects(access)
        })
    }

    #[must_use]
    pub fn in_breakpoint(&self) -> bool {
        self.in_breakpoint
    }

    pub fn set_in_breakpoint(&mut self, in_breakpoint: bool) {
        self.in_breakpoint = in_breakpoint;
    }
}
