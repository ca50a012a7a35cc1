//! Fingerprint computation for issue grouping.
//!
//! Events with the same message and the same top three stack frames land in
//! the same issue regardless of how the deeper frames differ.

use sha2::{Digest, Sha256};

use crate::event::StackFrame;

/// Number of leading stack frames that contribute to the fingerprint.
const FRAME_DEPTH: usize = 3;

/// Compute a stable 128-bit hex fingerprint from a message and stack trace.
///
/// Each contributing frame is normalized to `file:line:column:function`
/// with missing fields as empty strings. The digest is the first 128 bits
/// of a SHA-256 over the joined input; this is a bucketing key, not a
/// security primitive.
#[must_use]
pub fn compute_fingerprint(message: &str, frames: &[StackFrame]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(message.as_bytes());
    for frame in frames.iter().take(FRAME_DEPTH) {
        hasher.update(b"\n");
        hasher.update(frame.normalized().as_bytes());
    }
    let digest = hasher.finalize();
    hex::encode(&digest[..16])
}
