pub mod ancestors;
pub mod databases;
pub mod directory;
pub mod filter;
pub mod ldap_client;
pub mod memory;
pub mod mutation;

pub use ancestors::*;
pub use databases::*;
pub use directory::*;
pub use ldap_client::LdapDirectory;
pub use memory::InMemoryDirectory;
pub use mutation::*;
