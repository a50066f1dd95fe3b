//! Text hygiene for maitre: input sanitation and the output content firewall.
//!
//! Provides:
//! - **Input sanitation**: truncation, script-construct removal, whitespace collapse
//! - **Output validation**: an ordered pipeline that rejects leaked error text,
//!   strips code-execution fragments, cuts degenerate repetition and bounds length

pub mod sanitize;
pub mod validate;

pub use sanitize::sanitize_input;
pub use validate::{
    APOLOGY, DIDNT_UNDERSTAND, OutputPolicy, OutputValidator, RejectReason, Validated,
    validate_output,
};
