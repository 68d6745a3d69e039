// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Pure Rust structs, enums and traits describing the core
// concepts of the captioning system.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O or network calls
//   - Only plain Rust structs, enums, and traits
//
// Everything here can be unit tested without a GPU.
//
// Reference: Rust Book §5 (Structs), §10 (Traits)
//            Vinyals et al. (2015) Show and Tell

// Train / Eval / Inference selector
pub mod mode;

// Word <-> id mapping with reserved start/end/unknown words
pub mod vocabulary;

// Beam-search hypotheses and the bounded top-N container
pub mod caption;

// An image with its raw human-written captions
pub mod image_metadata;

// Core abstractions (traits) that other layers implement
pub mod traits;
