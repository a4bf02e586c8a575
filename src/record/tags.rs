//! Record tag table
//!
//! The writer identifies each record kind by a one-byte index into this
//! fixed table. Index 0 is reserved and never written.

/// Tag names, indexed by the high byte of header word 0
pub const TAGS: &[&str] = &[
    "",
    "Debug",
    "Error",
    "CLI",
    "SessOpen",
    "SessClose",
    "BackendOpen",
    "BackendReuse",
    "BackendClose",
    "HttpGarbage",
    "Proxy",
    "ProxyGarbage",
    "Length",
    "FetchError",
    "ReqMethod",
    "ReqURL",
    "ReqProtocol",
    "ReqStatus",
    "ReqReason",
    "ReqHeader",
    "ReqUnset",
    "ReqLost",
    "RespMethod",
    "RespURL",
    "RespProtocol",
    "RespStatus",
    "RespReason",
    "RespHeader",
    "RespUnset",
    "RespLost",
    "BereqMethod",
    "BereqURL",
    "BereqProtocol",
    "BereqStatus",
    "BereqReason",
    "BereqHeader",
    "BereqUnset",
    "BereqLost",
    "BerespMethod",
    "BerespURL",
    "BerespProtocol",
    "BerespStatus",
    "BerespReason",
    "BerespHeader",
    "BerespUnset",
    "BerespLost",
    "ObjMethod",
    "ObjURL",
    "ObjProtocol",
    "ObjStatus",
    "ObjReason",
    "ObjHeader",
    "ObjUnset",
    "ObjLost",
    "BogoHeader",
    "LostHeader",
    "TTL",
    "Fetch_Body",
    "VCL_acl",
    "VCL_call",
    "VCL_trace",
    "VCL_return",
    "ReqStart",
    "Hit",
    "HitPass",
    "ExpBan",
    "ExpKill",
    "WorkThread",
    "ESI_xmlerror",
    "Hash",
    "Backend_health",
    "VCL_Log",
    "VCL_Error",
    "Gzip",
    "Link",
    "Begin",
    "End",
    "VSL",
    "Storage",
    "Timestamp",
    "ReqAcct",
    "PipeAcct",
    "BereqAcct",
    "VfpAcct",
    "Witness",
    "H2RxHdr",
    "H2RxBody",
    "H2TxHdr",
    "H2TxBody",
    "HitMiss",
    "BackendStart",
    "SessError",
    "VCL_use",
];

/// Look up a tag name by index; unassigned indexes map to `None`
pub fn tag_name(index: u8) -> Option<&'static str> {
    match TAGS.get(index as usize) {
        Some(name) if !name.is_empty() => Some(*name),
        _ => None,
    }
}

/// Reverse lookup, case-insensitive like the writer's own tag parser
pub fn tag_index(name: &str) -> Option<u8> {
    TAGS.iter()
        .position(|t| !t.is_empty() && t.eq_ignore_ascii_case(name))
        .map(|i| i as u8)
}

/// All tag indexes whose name starts with `prefix` (case-insensitive)
pub fn tags_with_prefix(prefix: &str) -> Vec<u8> {
    let prefix = prefix.to_ascii_lowercase();
    TAGS.iter()
        .enumerate()
        .filter(|(_, t)| !t.is_empty() && t.to_ascii_lowercase().starts_with(&prefix))
        .map(|(i, _)| i as u8)
        .collect()
}
