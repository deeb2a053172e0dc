//! XML plumbing for the nextdav CalDAV engine.
//!
//! - [`security`] - policy checks and heuristic attack detectors run on
//!   untrusted XML before parsing
//! - [`document`] - [`XmlBuilder`], the cursor-based request body builder
//! - [`parser`] - [`parse_xml`], turning response bodies into an [`XmlTree`]
//! - [`lookup`] - prefix-tolerant accessors such as [`get_multistatus`]
//!
//! # Data flow
//!
//! ```text
//!  request intent ──► XmlBuilder ──► XML string ──► HTTP collaborator
//!
//!  HTTP collaborator ──► XML string ──► security::validate
//!                                            │
//!                                            ▼
//!                                   parse_xml ──► XmlTree ──► lookup helpers
//! ```

pub mod document;
pub mod lookup;
pub mod parser;
pub mod security;
pub mod tree;

pub use document::{BuilderError, NodeBody, XmlBuilder, XmlNode, escape_xml};
pub use lookup::{find_child, find_children, find_text, get_multistatus, get_responses, local_name};
pub use parser::{ParseFailure, ParseOptions, XmlParseError, parse_xml};
pub use security::{
    Detection, SecurityIssue, SecurityPolicy, ValidationReport, detect_entity_expansion_attack,
    detect_xxe_attempt, estimate_depth, sanitize, validate,
};
pub use tree::{XmlObject, XmlTree, XmlValue};
