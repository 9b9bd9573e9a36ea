mod directory;

pub use directory::{DirectoryAccessor, DirectoryBackend};
