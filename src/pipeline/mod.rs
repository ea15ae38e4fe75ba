//! Pipeline stages for PDF order extraction.
//!
//! Each submodule implements one transformation step and is testable on its
//! own.
//!
//! ## Data Flow
//!
//! ```text
//!            ┌─▶ render ─▶ encode ─┐
//! PDF bytes ─┤                     ├─▶ compose ─▶ service ─▶ validate
//!            └─▶ text ─────────────┘      ▲
//!                        auxiliary ───────┘
//! ```
//!
//! 1. [`backend`]: the pdfium seam ([`backend::PdfBackend`])
//! 2. [`render`]: rasterise every page; runs in `spawn_blocking` because
//!    pdfium is not async-safe
//! 3. [`encode`]: PNG-encode and base64-wrap each page
//! 4. [`text`]: optional embedded text layer
//! 5. [`auxiliary`]: decode the secondary file in whatever encoding it uses
//! 6. [`compose`]: order everything into one request
//! 7. [`service`]: the remote model call with retry/backoff; the only
//!    stage with network I/O
//! 8. [`validate`]: well-formedness check of the reply

pub mod auxiliary;
pub mod backend;
pub mod compose;
pub mod encode;
pub mod render;
pub mod service;
pub mod text;
pub mod validate;
