//! Shared CLI helpers used across multiple commands.

use ringvox_core::{ChannelId, Vec3};

/// Parse `X,Y,Z` for clap's `value_parser`. Missing trailing components are 0.
pub fn parse_vec3(s: &str) -> Result<Vec3, String> {
    let parts: Vec<&str> = s.split(',').collect();
    if parts.is_empty() || parts.len() > 3 {
        return Err(format!("'{s}' must have no more than X,Y,Z components"));
    }
    let mut v = [0.0f32; 3];
    for (slot, part) in v.iter_mut().zip(&parts) {
        *slot = part
            .trim()
            .parse()
            .map_err(|_| format!("'{part}' is not a number"))?;
    }
    Ok(v)
}

/// Parse a sample range `A:B` for clap's `value_parser`.
pub fn parse_range(s: &str) -> Result<(u64, u64), String> {
    let Some((a, b)) = s.split_once(':') else {
        return Err(format!("'{s}' must have exactly INT:INT components"));
    };
    let begin = a
        .trim()
        .parse()
        .map_err(|_| format!("'{a}' is not a sample index"))?;
    let end = b
        .trim()
        .parse()
        .map_err(|_| format!("'{b}' is not a sample index"))?;
    Ok((begin, end))
}

/// Parse a channel name for clap's `value_parser`.
pub fn parse_channel(s: &str) -> Result<ChannelId, String> {
    ChannelId::from_name(&s.to_ascii_lowercase()).ok_or_else(|| {
        let names: Vec<&str> = ChannelId::ALL.iter().map(|c| c.name()).collect();
        format!("unknown channel '{s}', valid values are: {}", names.join(", "))
    })
}

/// Human-readable byte count.
pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_vec3() {
        assert_eq!(parse_vec3("1,2,3").unwrap(), [1.0, 2.0, 3.0]);
        assert_eq!(parse_vec3("-0.5").unwrap(), [-0.5, 0.0, 0.0]);
        assert_eq!(parse_vec3(" 4 , 5 ").unwrap(), [4.0, 5.0, 0.0]);
        assert!(parse_vec3("1,2,3,4").is_err());
        assert!(parse_vec3("1,x").is_err());
    }

    #[test]
    fn test_parse_range() {
        assert_eq!(parse_range("100:2000").unwrap(), (100, 2000));
        assert!(parse_range("100").is_err());
        assert!(parse_range("-1:5").is_err());
        assert!(parse_range("a:b").is_err());
    }

    #[test]
    fn test_parse_channel() {
        assert_eq!(parse_channel("music").unwrap(), ChannelId::Music);
        assert_eq!(parse_channel("VOICE").unwrap(), ChannelId::Voice);
        let err = parse_channel("ambient").unwrap_err();
        assert!(err.contains("sound"));
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }
}
