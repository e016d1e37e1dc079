//! Property-based tests for the fault-status decoder and classifier.
//! Verifies invariants hold for ALL register states, not just fixed examples.

use fault::registers::{BFSR_BFARVALID, MMFSR_MMARVALID};
use fault::{classify, decode, FaultCause, RawFaultRegisters};

proptest::proptest! {
    /// Same snapshot in, same record set out — decoding has no hidden state.
    #[test]
    fn decode_is_deterministic(cfsr in 0u32..=u32::MAX, hfsr in 0u32..=u32::MAX,
                               mmfar in 0u32..=u32::MAX, bfar in 0u32..=u32::MAX) {
        let snapshot = RawFaultRegisters { cfsr, hfsr, mmfar, bfar };
        assert_eq!(decode(&snapshot), decode(&snapshot));
    }

    /// Addresses only surface under a set address-valid flag.
    #[test]
    fn addresses_are_gated_on_valid_flags(cfsr in 0u32..=u32::MAX,
                                          mmfar in 0u32..=u32::MAX,
                                          bfar in 0u32..=u32::MAX) {
        let snapshot = RawFaultRegisters { cfsr, hfsr: 0, mmfar, bfar };
        let records = decode(&snapshot);
        if let Some(mem) = records.mem {
            assert_eq!(mem.address.is_some(), cfsr & MMFSR_MMARVALID != 0);
            if let Some(addr) = mem.address {
                assert_eq!(addr, mmfar);
            }
        }
        if let Some(bus) = records.bus {
            assert_eq!(bus.address.is_some(), cfsr & BFSR_BFARVALID != 0);
            if let Some(addr) = bus.address {
                assert_eq!(addr, bfar);
            }
        }
    }

    /// A fault class appears iff its status byte has a bit set.
    #[test]
    fn record_presence_tracks_status_bytes(cfsr in 0u32..=u32::MAX, hfsr in 0u32..=u32::MAX) {
        let snapshot = RawFaultRegisters { cfsr, hfsr, mmfar: 0, bfar: 0 };
        let records = decode(&snapshot);
        assert_eq!(records.mem.is_some(), cfsr & 0x0000_00FF != 0);
        assert_eq!(records.bus.is_some(), cfsr & 0x0000_FF00 != 0);
        // Reserved UFSR bits are not decoded as flags but do make the class
        // present; restrict the check to the architecturally defined bits.
        let ufsr_defined = cfsr & 0x030F_0000;
        if ufsr_defined != 0 {
            assert!(records.usage.is_some());
        }
    }

    /// Exactly one canonical cause per trap, whatever is latched.
    #[test]
    fn classification_is_total_and_deterministic(cfsr in 0u32..=u32::MAX,
                                                 hfsr in 0u32..=u32::MAX,
                                                 mmfar in 0u32..=u32::MAX,
                                                 bfar in 0u32..=u32::MAX) {
        let snapshot = RawFaultRegisters { cfsr, hfsr, mmfar, bfar };
        let first = classify(&decode(&snapshot));
        let second = classify(&decode(&snapshot));
        assert_eq!(first, second);
    }

    /// An empty snapshot never classifies as anything but Unknown.
    #[test]
    fn address_registers_alone_never_fabricate_a_cause(mmfar in 0u32..=u32::MAX,
                                                       bfar in 0u32..=u32::MAX) {
        let snapshot = RawFaultRegisters { cfsr: 0, hfsr: 0, mmfar, bfar };
        assert_eq!(classify(&decode(&snapshot)), FaultCause::Unknown);
    }
}
