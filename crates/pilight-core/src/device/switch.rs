//! Binary switch support.

/// Protocols whose devices behave as plain on/off switches.
pub(crate) const SUPPORTED_PROTOCOLS: &[&str] = &[
    "kaku_switch",
    "nexa_switch",
    "beamish_switch",
    "kaku_switch_old",
    "clarus_switch",
    "elro_300_switch",
    "elro_400_switch",
    "elro_800_switch",
    "coco_switch",
    "dio_switch",
    "intertechno_old",
    "intertechno_switch",
    "smartwares_switch",
    "brennenstuhl",
    "cogex",
    "duwi",
    "rsl366",
    "techlico_switch",
    "cleverwatts",
    "quigg",
    "gt1000",
    "quigg_gt7000",
    "impuls",
    "promax",
    "selectremote",
    "silvercrest",
    "x10",
];

pub(crate) fn is_supported_protocol(protocol: &str) -> bool {
    SUPPORTED_PROTOCOLS.contains(&protocol)
}
