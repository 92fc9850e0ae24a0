pub mod revalidate;

pub use revalidate::{RevalidateConfig, RevalidateHandle, RevalidateService};
