//! On-disk file management: file families, the B+Tree page store, the
//! superblock (`param` file), and the inverted-list freespace map.

pub mod file_family;
pub mod freespace;
pub mod page_store;
pub mod param;

pub use file_family::FileFamily;
pub use freespace::{Allocation, FreespaceMap, Strategy as FreespaceStrategy};
pub use page_store::FilePageStore;
pub use param::{IndexStats, Superblock};
