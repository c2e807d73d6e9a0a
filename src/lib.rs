pub mod error;
pub mod header;
pub mod digest;
pub mod split;
pub mod codec;
pub mod io_stream;
pub mod perf;
pub mod reassembly;
pub mod verify;
pub mod index;
pub mod archive;

pub use error::{Error, HeaderField, Result};
pub use header::{ChunkHeader, FORMAT_VERSION};
pub use digest::digest;
pub use split::{split, ChunkPolicy};
pub use codec::{ContentCodec, ZipDeflate};
pub use io_stream::{FsPartSource, PartSource, PartWriter};
pub use reassembly::{reassemble, Part, ReassembledArchive};
pub use verify::{verify, VerifiedArchive};
pub use index::{PartIndex, PartRecord};
pub use archive::{Archive, PackOptions, Progress, UnpackOptions};
