// src/db/mod.rs

//! Path derivation for this crate's two SQLite-backed stores. The schemas
//! themselves live with the stores they back ([`crate::hashdb`],
//! [`crate::statsdb`]) rather than in a shared schema module, since each
//! store owns exactly one table and its own migration.

pub mod paths;
