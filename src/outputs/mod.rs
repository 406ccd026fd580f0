//! Output generation for a finished run.
//!
//! # Submodules
//!
//! - [`json`]: article caches, one of which feeds `run --reuse-cache`
//! - [`pdf`]: the comprehensive PDF report
//! - [`dashboard`]: the static HTML dashboard
//!
//! # Output Structure
//!
//! ```text
//! output_dir/
//! ├── articles.json
//! ├── processed_articles.json
//! ├── b2b_vault_comprehensive_report_20250630_161238.pdf
//! └── website/
//!     ├── index.html
//!     └── b2b_vault_comprehensive_report_20250630_161238.pdf
//! ```

pub mod dashboard;
pub mod json;
pub mod pdf;
