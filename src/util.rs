use crate::engine::{ALL_CHANNELS, KeySelection, LabelMode, fixed_key};
use crate::model::theory::{MAJOR_SCALE, find_scale, parse_root};
use anyhow::{Result, anyhow};
use log::{info, warn};

pub fn parse_mode(s: &str) -> LabelMode {
    match s.to_lowercase().as_str() {
        "n" | "name" | "names" | "chord" => LabelMode::Name,
        "r" | "roman" | "numeral" | "numerals" => LabelMode::Roman,
        other => {
            info!("Unknown label mode '{}', defaulting to `name`..!", other);
            LabelMode::Name
        }
    }
}

/// `None` or an unparseable root means the key is detected; the scale defaults to major.
pub fn parse_key_selection(root: Option<&str>, scale: Option<&str>) -> KeySelection {
    let Some(root_name) = root else {
        if let Some(scale) = scale {
            info!("Scale '{}' given without --key, following the detected key..!", scale);
        }
        return KeySelection::Auto;
    };

    let Some(root) = parse_root(root_name) else {
        warn!("Unknown key root '{}', following the detected key..!", root_name);
        return KeySelection::Auto;
    };

    let scale = match scale {
        None => MAJOR_SCALE,
        Some(name) => match find_scale(name) {
            Some(found) => found.name,
            None => {
                warn!("Unknown scale '{}', labels will use the closest fallback..!", name);
                name
            }
        },
    };

    fixed_key(root, Some(scale))
}

/// Accepts `all`, hexadecimal (`0x00ff`) or decimal masks.
pub fn parse_channel_mask(s: &str) -> Result<u16> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("all") {
        return Ok(ALL_CHANNELS);
    }

    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse::<u16>(),
    };

    parsed.map_err(|e| anyhow!("Invalid channel mask '{}': {}", s, e))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::theory::MINOR_SCALE;

    #[test]
    fn label_modes() {
        assert_eq!(parse_mode("Roman"), LabelMode::Roman);
        assert_eq!(parse_mode("r"), LabelMode::Roman);
        assert_eq!(parse_mode("name"), LabelMode::Name);
        assert_eq!(parse_mode("??"), LabelMode::Name);
    }

    #[test]
    fn key_selections() {
        env_logger::try_init().unwrap_or(());

        assert_eq!(parse_key_selection(None, None), KeySelection::Auto);
        assert_eq!(parse_key_selection(None, Some("Dorian")), KeySelection::Auto);
        assert_eq!(parse_key_selection(Some("H"), None), KeySelection::Auto);

        assert_eq!(
            parse_key_selection(Some("Bb"), None),
            KeySelection::Fixed {
                root: 10,
                scale: MAJOR_SCALE.to_owned()
            }
        );
        assert_eq!(
            parse_key_selection(Some("f#"), Some("Minor")),
            KeySelection::Fixed {
                root: 6,
                scale: MINOR_SCALE.to_owned()
            }
        );
        assert_eq!(
            parse_key_selection(Some("C"), Some("Weird Minor")),
            KeySelection::Fixed {
                root: 0,
                scale: "Weird Minor".to_owned()
            }
        );
    }

    #[test]
    fn channel_masks() {
        assert_eq!(parse_channel_mask("all").unwrap(), 0xFFFF);
        assert_eq!(parse_channel_mask("0x00ff").unwrap(), 0x00FF);
        assert_eq!(parse_channel_mask("5").unwrap(), 5);
        assert!(parse_channel_mask("0xfffff").is_err());
        assert!(parse_channel_mask("lots").is_err());
    }
}
