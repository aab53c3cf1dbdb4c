//! Project-level data: build-system declarations, core metadata and
//! distribution naming rules shared by the builder and the installer.

pub mod metadata;
pub mod normalize;
pub mod requirements;
pub mod spec;

pub use metadata::CoreMetadata;
pub use normalize::{canonicalize_name, names_match};
pub use requirements::{classify_requirements, requirement_name, RequirementSets, TEST_EXTRAS};
pub use spec::{
    load_spec, BackendDescriptor, BuildSystem, ProjectSpec, DEFAULT_BUILD_BACKEND,
    DEFAULT_BUILD_REQUIRES,
};
