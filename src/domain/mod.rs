pub mod dicom;
pub mod dn;
pub mod entry;
pub mod templates;
pub mod tree;

pub use dicom::*;
pub use dn::EntryType;
pub use entry::*;
pub use templates::*;
pub use tree::*;
