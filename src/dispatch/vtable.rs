// Wed Feb 4 2026 - Alex

use crate::ffi::{ModuleError, ModuleImage, PTR_BYTES};

/// Scan a virtual table for the slot holding `target` (an absolute
/// address), reading at most `window` pointer-width slots starting at the
/// absolute `vtable_base`. Returns the slot index, or `None` when the
/// window is exhausted.
pub fn find_vtable_slot(
    image: &dyn ModuleImage,
    vtable_base: u64,
    target: u64,
    window: usize,
) -> Result<Option<usize>, ModuleError> {
    for slot in 0..window {
        let entry = image.read_ptr(vtable_base + slot as u64 * PTR_BYTES)?;
        if entry == target {
            return Ok(Some(slot));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffi::FakeModule;

    #[test]
    fn test_finds_slot_by_pointer_compare() {
        let module = FakeModule::new(0x1000, 0x200);
        // Vtable at rva 0x40, target function at absolute 0x1000 + 0x88.
        module.store_ptr(0x1040, 0x2222).unwrap();
        module.store_ptr(0x1048, 0x1088).unwrap();
        module.store_ptr(0x1050, 0x3333).unwrap();
        assert_eq!(find_vtable_slot(&module, 0x1040, 0x1088, 8).unwrap(), Some(1));
    }

    #[test]
    fn test_exhausted_window_is_none() {
        let module = FakeModule::new(0x1000, 0x200);
        module.store_ptr(0x1040, 0x2222).unwrap();
        assert_eq!(find_vtable_slot(&module, 0x1040, 0x9999, 4).unwrap(), None);
    }
}
