/// Turn a version string into a form that compares correctly as a plain string.
///
/// A leading `v` and any `+build` suffix are dropped, numeric segments are left-padded with zeros
/// to five digits and, when there is no pre-release tag, a `~` segment is appended so that `1.0.0`
/// sorts after `1.0.0-beta`.
///
/// ```
/// # use growthbook::padded_version_string;
/// assert_eq!(padded_version_string("v1.2.3"), "00001-00002-00003-~");
/// assert!(padded_version_string("1.0.0") > padded_version_string("1.0.0-rc.1"));
/// ```
pub fn padded_version_string(input: &str) -> String {
    let without_prefix = input.strip_prefix('v').unwrap_or(input);
    let core = match without_prefix.find('+') {
        Some(i) => &without_prefix[..i],
        None => without_prefix,
    };

    let mut parts: Vec<&str> = core.split(['.', '-']).collect();
    if parts.len() == 3 {
        parts.push("~");
    }

    parts
        .into_iter()
        .filter(|part| !part.is_empty())
        .map(|part| {
            if part.bytes().all(|b| b.is_ascii_digit()) {
                format!("{part:0>5}")
            } else {
                part.to_owned()
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}
