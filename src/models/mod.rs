pub mod boundary;
pub mod grid;
pub mod loaders;
pub mod namelist;
pub mod status;
pub mod work_unit;

pub use boundary::{auto_bounds, Boundary, DofSpace};
pub use grid::{Profile, Species, TransportGrid};
pub use loaders::{load_config_file, read_text};
pub use namelist::{Namelist, NamelistValue};
pub use status::Status;
pub use work_unit::{iteration_dir_name, JobRecord, Stage, WorkUnit};
