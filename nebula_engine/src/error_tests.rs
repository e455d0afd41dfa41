//! Unit tests for error.rs
//!
//! Covers Display strings, fatality classification and `?` propagation.

use crate::error::{Error, Result};
use crate::graphics_device::DescriptorHeapKind;

// ============================================================================
// ERROR DISPLAY TESTS
// ============================================================================

#[test]
fn test_backend_error_display() {
    let err = Error::BackendError("vkQueueSubmit failed".to_string());
    let display = format!("{}", err);
    assert!(display.contains("Backend error"));
    assert!(display.contains("vkQueueSubmit failed"));
}

#[test]
fn test_out_of_memory_display() {
    assert_eq!(format!("{}", Error::OutOfMemory), "Out of GPU memory");
}

#[test]
fn test_descriptor_heap_exhausted_display() {
    let err = Error::DescriptorHeapExhausted {
        kind: DescriptorHeapKind::RenderTarget,
        capacity: 128,
    };
    let display = format!("{}", err);
    assert!(display.contains("RenderTarget"));
    assert!(display.contains("128"));
}

#[test]
fn test_constant_ring_overflow_display() {
    let err = Error::ConstantRingOverflow { requested: 256, capacity: 5_120_000 };
    let display = format!("{}", err);
    assert!(display.contains("256 bytes requested"));
    assert!(display.contains("5120000"));
}

#[test]
fn test_fence_timeout_display() {
    let err = Error::FenceTimeout { slot: Some(1), value: 42, timeout_ms: 5000 };
    let display = format!("{}", err);
    assert!(display.contains("slot 1"));
    assert!(display.contains("value 42"));
    assert!(display.contains("5000 ms"));
}

#[test]
fn test_fence_timeout_display_without_slot() {
    let err = Error::FenceTimeout { slot: None, value: 3, timeout_ms: 5000 };
    let display = format!("{}", err);
    assert!(!display.contains("slot"));
    assert!(display.contains("value 3"));
}

#[test]
fn test_shader_load_failed_display() {
    let err = Error::ShaderLoadFailed {
        path: "shaders/ShadowVS.spv".to_string(),
        reason: "file not found".to_string(),
    };
    let display = format!("{}", err);
    assert!(display.contains("ShadowVS.spv"));
    assert!(display.contains("file not found"));
}

#[test]
fn test_scene_not_bound_display() {
    let err = Error::SceneNotBound("ShadowStage".to_string());
    assert_eq!(format!("{}", err), "Scene not bound: ShadowStage");
}

#[test]
fn test_invalid_frame_slot_display() {
    let err = Error::InvalidFrameSlot { slot: 3, frame_count: 2 };
    assert_eq!(format!("{}", err), "Invalid frame slot: 3 (frame count 2)");
}

// ============================================================================
// CLASSIFICATION
// ============================================================================

#[test]
fn test_only_invalid_resource_is_recoverable() {
    assert!(!Error::InvalidResource("missing.png".to_string()).is_fatal());

    assert!(Error::OutOfMemory.is_fatal());
    assert!(Error::BackendError("lost".to_string()).is_fatal());
    assert!(Error::SceneNotBound("SceneStage".to_string()).is_fatal());
    assert!(Error::FenceTimeout { slot: None, value: 1, timeout_ms: 1 }.is_fatal());
    assert!(Error::ConstantRingOverflow { requested: 256, capacity: 0 }.is_fatal());
    assert!(Error::DescriptorHeapExhausted {
        kind: DescriptorHeapKind::ShaderResource,
        capacity: 2,
    }
    .is_fatal());
}

// ============================================================================
// ERROR TRAIT IMPLEMENTATIONS
// ============================================================================

#[test]
fn test_error_is_std_error() {
    let err = Error::OutOfMemory;
    let _: &dyn std::error::Error = &err;
}

#[test]
fn test_error_clone_and_eq() {
    let err = Error::FenceTimeout { slot: Some(0), value: 7, timeout_ms: 10 };
    assert_eq!(err.clone(), err);
}

// ============================================================================
// ERROR PROPAGATION TESTS
// ============================================================================

#[test]
fn test_error_propagation_with_question_mark() {
    fn inner() -> Result<i32> {
        Err(Error::ConstantRingOverflow { requested: 256, capacity: 256 })
    }

    fn outer() -> Result<i32> {
        inner()?;
        Ok(42)
    }

    assert!(matches!(outer(), Err(Error::ConstantRingOverflow { .. })));
}
