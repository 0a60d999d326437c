use crate::record::ChunkRecord;

/// Opaque handle to whatever render/collision resources a chunk container owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceHandle(pub u64);

/// Seam to the engine that owns meshes and colliders. The streaming core
/// never builds geometry itself; it tells the factory when to.
pub trait ResourceFactory {
    /// Allocate a container for chunks of `resolution` samples per side.
    fn allocate(&mut self, resolution: u32) -> ResourceHandle;

    /// A record became ready or was regenerated; rebuild its geometry from
    /// the cached height field.
    fn upload(&mut self, record: &ChunkRecord);

    /// Placement or collider wish changed without a new field.
    fn place(&mut self, record: &ChunkRecord);

    /// The record left the working set; its container may be reused.
    fn retire(&mut self, _record: &ChunkRecord) {}

    /// Destroy a container that will not be reused.
    fn release(&mut self, handle: ResourceHandle);
}

/// Factory that only hands out sequential handles and counts calls.
#[derive(Debug, Default)]
pub struct HandleFactory {
    next: u64,
    live: usize,
    uploads: u64,
    placements: u64,
}

impl HandleFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Containers allocated and not yet released.
    pub fn live(&self) -> usize {
        self.live
    }

    /// Total containers ever allocated.
    pub fn allocated(&self) -> u64 {
        self.next
    }

    pub fn uploads(&self) -> u64 {
        self.uploads
    }

    pub fn placements(&self) -> u64 {
        self.placements
    }
}

impl ResourceFactory for HandleFactory {
    fn allocate(&mut self, _resolution: u32) -> ResourceHandle {
        self.next += 1;
        self.live += 1;
        ResourceHandle(self.next)
    }

    fn upload(&mut self, _record: &ChunkRecord) {
        self.uploads += 1;
    }

    fn place(&mut self, _record: &ChunkRecord) {
        self.placements += 1;
    }

    fn release(&mut self, _handle: ResourceHandle) {
        self.live = self.live.saturating_sub(1);
    }
}
