/// Left-pad `s` with `fill` up to `width` characters. Longer input is
/// returned unchanged.
pub fn pad_start(s: &str, width: usize, fill: char) -> String {
    let len = s.chars().count();
    if len >= width {
        return s.to_string();
    }
    let mut out: String = std::iter::repeat_n(fill, width - len).collect();
    out.push_str(s);
    out
}

/// RFD numbers are published as four digits: `77` → `0077`.
pub fn rfd_number(n: &str) -> String {
    pad_start(n.trim_start_matches('0'), 4, '0')
}
