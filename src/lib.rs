pub mod archive;
pub mod buffer;
pub mod error;
pub mod header;
pub mod layout;
pub mod reader;
pub mod table;
pub mod transform;
pub mod tree;
pub mod writer;

pub use archive::{pack, extract, list, info, encrypt, decrypt, PackOptions, ExtractOptions};
pub use error::{PackError, Limit, Result};
pub use header::{Header, MAGIC, HEADER_SIZE};
pub use layout::LayoutPlan;
pub use reader::{ArchiveReader, FileRecord, Listing};
pub use table::{TableEntry, DirEntry, FileEntry, DirTable, ENTRY_SIZE, MAX_NAME_LEN};
pub use tree::{DirNode, FileNode};
pub use writer::ArchiveWriter;
