/// Rewrite every class name referenced by a descriptor. `map` returns the
/// replacement name, or `None` to wildcard the reference as `*`.
pub(crate) fn remap_descriptor(
    descriptor: &str,
    mut map: impl FnMut(&str) -> Option<String>,
) -> String {
    let mut out = String::with_capacity(descriptor.len());
    let mut index = 0;
    let bytes = descriptor.as_bytes();
    while index < bytes.len() {
        if bytes[index] == b'L' {
            match descriptor[index..].find(';') {
                Some(relative_end) => {
                    let end = index + relative_end;
                    let name = &descriptor[index + 1..end];
                    match map(name) {
                        Some(mapped) => {
                            out.push('L');
                            out.push_str(&mapped);
                            out.push(';');
                        }
                        None => out.push_str("L*;"),
                    }
                    index = end + 1;
                }
                None => {
                    // Malformed tail; keep it verbatim rather than guessing.
                    out.push_str(&descriptor[index..]);
                    break;
                }
            }
        } else {
            out.push(bytes[index] as char);
            index += 1;
        }
    }
    out
}

/// Parameter-type census of a method descriptor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct ParamStats {
    pub(crate) primitives: usize,
    pub(crate) objects: usize,
    pub(crate) arrays: usize,
    pub(crate) total: usize,
}

pub(crate) fn param_stats(descriptor: &str) -> ParamStats {
    let mut stats = ParamStats::default();
    let Some(open) = descriptor.find('(') else {
        return stats;
    };
    let Some(close) = descriptor.find(')') else {
        return stats;
    };
    let params = &descriptor[open + 1..close];

    let bytes = params.as_bytes();
    let mut index = 0;
    while index < bytes.len() {
        stats.total += 1;
        if bytes[index] == b'[' {
            stats.arrays += 1;
            while index < bytes.len() && bytes[index] == b'[' {
                index += 1;
            }
            if index < bytes.len() && bytes[index] == b'L' {
                index = match params[index..].find(';') {
                    Some(end) => index + end + 1,
                    None => bytes.len(),
                };
            } else {
                index += 1;
            }
        } else if bytes[index] == b'L' {
            stats.objects += 1;
            index = match params[index..].find(';') {
                Some(end) => index + end + 1,
                None => bytes.len(),
            };
        } else {
            stats.primitives += 1;
            index += 1;
        }
    }
    stats
}

pub(crate) fn return_type(descriptor: &str) -> &str {
    match descriptor.find(')') {
        Some(close) => &descriptor[close + 1..],
        None => "",
    }
}
