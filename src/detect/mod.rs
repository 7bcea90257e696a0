//! Debounce and press detection.
//!
//! Each monitored block owns an [`EdgeDetector`], which keeps a sliding
//! [`Window`] of the block's most recent samples and turns it into
//! [`PressEvent`]s.
//!
//! ```text
//! FieldSource::read() ──▶ EdgeDetector::observe()
//!                              │
//!                              ├──▶ Window::push()      (evicts oldest)
//!                              │
//!                              └──▶ per input:
//!                                     D highs in a row  → long,  clear input
//!                                     high then low     → short, clear input
//! ```

pub mod detector;
pub mod window;

pub use detector::{EdgeDetector, PressEvent, PressKind};
pub use window::Window;
