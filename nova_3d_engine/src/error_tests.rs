use super::*;

// ============================================================================
// Display formatting tests
// ============================================================================

#[test]
fn test_backend_error_display() {
    let err = Error::BackendError("vkQueueSubmit failed".to_string());
    assert_eq!(err.to_string(), "Backend error: vkQueueSubmit failed");
}

#[test]
fn test_out_of_memory_display() {
    assert_eq!(Error::OutOfMemory.to_string(), "Out of GPU memory");
}

#[test]
fn test_capacity_exceeded_display() {
    let err = Error::CapacityExceeded { table: "images", capacity: 200 };
    assert_eq!(
        err.to_string(),
        "Capacity exceeded: images table is full (200 entries)"
    );
}

#[test]
fn test_fence_timeout_display() {
    let err = Error::FenceTimeout { frame_slot: 1 };
    assert_eq!(err.to_string(), "Fence timeout: frame slot 1 never completed");
}

#[test]
fn test_contract_violation_display() {
    let err = Error::ContractViolation("mesh 42 has no surfaces".to_string());
    assert_eq!(err.to_string(), "Contract violation: mesh 42 has no surfaces");
}

// ============================================================================
// Error trait tests
// ============================================================================

#[test]
fn test_implements_std_error() {
    fn assert_error<E: std::error::Error>(_e: &E) {}
    assert_error(&Error::OutOfMemory);
}

#[test]
fn test_errors_are_cloneable() {
    let err = Error::InvalidResource("shader 'default.frag'".to_string());
    let clone = err.clone();
    assert_eq!(err.to_string(), clone.to_string());
}
