//! Partition resolution for Hive-partitioned Parquet time series.
//!
//! Data lives under a storage root as
//! `<database>/<measurement>/date=YYYY-MM-DD/hour=HH/`, each hour directory
//! optionally carrying a `_manifest.json` that declares the time interval of
//! the partition and of every file in it.
//!
//! This crate turns a `SELECT` statement into the set of files that may hold
//! matching rows:
//!
//! - [`sql`] tokenizes the statement and extracts a
//!   [`QueryDescriptor`](sql::QueryDescriptor): table reference, time range and
//!   the remaining clause bodies.
//! - [`resolve`] walks the partition tree, pruning by manifest intervals, and
//!   falls back to a recursive scan when no calendar partition matches.
//! - [`interval`] holds the closed-interval overlap test both walks share.
//! - [`line_protocol`] decodes inbound points and assigns them to partitions.
//!
//! Engine integration (rewriting the statement over the resolved files and
//! executing it) lives in a separate crate; nothing here depends on a query
//! engine.
#![deny(missing_docs)]
pub mod interval;
pub mod layout;
pub mod line_protocol;
pub mod manifest;
pub mod resolve;
pub mod sql;
pub mod storage;
