//! Page table mapping each 64KB page of the external address space to a device

pub const PAGE_COUNT: usize = 0x1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Unhandled,
    Bios,
    Smpc,
    BackupRam,
    LowWram,
    StvIo,
    SlaveInputCapture,
    MasterInputCapture,
    Cs0,
    Cs1,
    Cs2,
    SoundRam,
    ScspRegisters,
    Vdp1Ram,
    Vdp1Framebuffer,
    Vdp1Registers,
    Vdp2Ram,
    Vdp2ColorRam,
    Vdp2Registers,
    Scu,
    HighWram,
}

/// Effective handler of a page. `Watched` pages have at least one memory breakpoint hook
/// installed and check accesses against them before dispatching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handler {
    Direct(Region),
    Watched(Region),
}

impl Handler {
    #[must_use]
    pub fn region(self) -> Region {
        match self {
            Self::Direct(region) | Self::Watched(region) => region,
        }
    }
}

// (first page, last page, device)
const MEMORY_MAP: &[(usize, usize, Region)] = &[
    (0x000, 0x00F, Region::Bios),
    (0x010, 0x017, Region::Smpc),
    (0x018, 0x01F, Region::BackupRam),
    (0x020, 0x02F, Region::LowWram),
    (0x040, 0x041, Region::StvIo),
    (0x100, 0x17F, Region::SlaveInputCapture),
    (0x180, 0x1FF, Region::MasterInputCapture),
    (0x200, 0x3FF, Region::Cs0),
    (0x400, 0x4FF, Region::Cs1),
    (0x580, 0x58F, Region::Cs2),
    (0x5A0, 0x5AF, Region::SoundRam),
    (0x5B0, 0x5BF, Region::ScspRegisters),
    (0x5C0, 0x5C7, Region::Vdp1Ram),
    (0x5C8, 0x5CF, Region::Vdp1Framebuffer),
    (0x5D0, 0x5D7, Region::Vdp1Registers),
    (0x5E0, 0x5EF, Region::Vdp2Ram),
    (0x5F0, 0x5F7, Region::Vdp2ColorRam),
    (0x5F8, 0x5FB, Region::Vdp2Registers),
    (0x5FE, 0x5FE, Region::Scu),
    (0x600, 0x7FF, Region::HighWram),
];

#[must_use]
pub fn page_of(address: u32) -> usize {
    ((address >> 16) & 0xFFF) as usize
}

#[derive(Debug, Clone)]
pub struct PageMap {
    handlers: Box<[Handler; PAGE_COUNT]>,
}

impl PageMap {
    #[must_use]
    pub fn new() -> Self {
        let mut handlers = Box::new([Handler::Direct(Region::Unhandled); PAGE_COUNT]);
        for &(start, end, region) in MEMORY_MAP {
            handlers[start..=end].fill(Handler::Direct(region));
        }

        Self { handlers }
    }

    #[must_use]
    pub fn handler(&self, address: u32) -> Handler {
        self.handlers[page_of(address)]
    }

    #[must_use]
    pub fn page_handler(&self, page: usize) -> Handler {
        self.handlers[page & (PAGE_COUNT - 1)]
    }

    #[must_use]
    pub fn region(&self, address: u32) -> Region {
        self.handler(address).region()
    }

    pub fn set_watched(&mut self, page: usize, watched: bool) {
        let handler = &mut self.handlers[page & (PAGE_COUNT - 1)];
        let region = handler.region();
        *handler = if watched { Handler::Watched(region) } else { Handler::Direct(region) };
    }

    /// Low and high work RAM are the only pages the SH-2 caches.
    #[must_use]
    pub fn is_cacheable(&self, address: u32) -> bool {
        matches!(self.region(address), Region::LowWram | Region::HighWram)
    }
}

impl Default for PageMap {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn every_page_has_a_handler() {
        let pages = PageMap::new();
        assert_eq!(pages.region(0x00000000), Region::Bios);
        assert_eq!(pages.region(0x20100001), Region::Smpc);
        assert_eq!(pages.region(0x00200000), Region::LowWram);
        assert_eq!(pages.region(0x21800000), Region::MasterInputCapture);
        assert_eq!(pages.region(0x25A7FFFE), Region::SoundRam);
        assert_eq!(pages.region(0x25D00000), Region::Vdp1Registers);
        assert_eq!(pages.region(0x25FE00A0), Region::Scu);
        assert_eq!(pages.region(0x060FFFFC), Region::HighWram);
        assert_eq!(pages.region(0x05FD0000), Region::Unhandled);
        assert_eq!(pages.region(0x00300000), Region::Unhandled);
    }

    #[test]
    fn cacheable_pages() {
        let pages = PageMap::new();
        assert!(pages.is_cacheable(0x06000000));
        assert!(pages.is_cacheable(0x002FFFFF));
        assert!(!pages.is_cacheable(0x25C00000));
        assert!(!pages.is_cacheable(0x00000000));
    }
}
