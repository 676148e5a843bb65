pub mod config;
pub mod error;
pub mod value;
pub mod row;
pub mod mapping;
pub mod coerce;
pub mod resolve;
pub mod mapper;
pub mod graph;
pub mod ingest;

pub use config::Config;
pub use error::{ErrorKind, LoaderError, Result};
pub use graph::{CreatedObject, GranoClient, GraphApi, MemoryGraph};
pub use ingest::{DispatchOptions, LoadReport, load_file};
pub use mapper::{MappedRow, RowMapper};
pub use mapping::Mapping;
pub use row::Row;
