pub mod admission;
pub mod html;

pub use admission::AdmissionFilter;
pub use html::parse_html;
