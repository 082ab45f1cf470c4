//! Parameter name to topic slug mapping

/// Lowercase, with every run of non-alphanumeric characters collapsed to `_`
///
/// `"Device On/Off"` becomes `"device_on_off"`.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_sep = false;

    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_sep && !slug.is_empty() {
                slug.push('_');
            }
            pending_sep = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_sep = true;
        }
    }

    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Device On/Off"), "device_on_off");
        assert_eq!(slugify("BMS Max. Temperature"), "bms_max_temperature");
        assert_eq!(slugify("On-Grid/Off-Grid Status"), "on_grid_off_grid_status");
        assert_eq!(slugify("  PV1 Voltage "), "pv1_voltage");
        assert_eq!(slugify("Ambient °C"), "ambient_c");
    }
}
