//! Build description model, parsing, and validation

mod arch;
mod load;
mod model;

pub use arch::{Arch, OsName, PlatformFamily};
pub use load::{SpecError, SPEC_FILE_NAME};
pub use model::{
    BuildSpec, CommonConfig, LibraryRef, OptionBinding, OptionValue, OverrideFragment,
};
