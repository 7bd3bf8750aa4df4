//! Text summaries of a projected view.
//!
//! Pure formatting over [`ViewRecord`]s; the output feeds prompt generation
//! downstream and is not parsed back.

use serde::{Deserialize, Serialize};

use crate::graph::Region;
use crate::status::{CamDist, CamPos};
use crate::view::ViewRecord;

/// Output language for descriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Ja,
}

impl Language {
    /// Parse a language code (`en`, `ja`, `ja-JP`, ...). Unknown codes fall back to English.
    pub fn from_code(code: &str) -> Self {
        let primary = code.trim().split(['-', '_']).next().unwrap_or_default();
        if primary.eq_ignore_ascii_case("ja") {
            Language::Ja
        } else {
            Language::En
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Ja => "ja",
        }
    }
}

/// One line per record, in record order.
pub fn describe_view(records: &[ViewRecord], lang: Language) -> Vec<String> {
    records.iter().map(|r| describe_record(r, lang)).collect()
}

/// Where the observer stands.
pub fn describe_region(region: Option<&Region>, lang: Language) -> String {
    match (region, lang) {
        (Some(r), Language::En) => {
            let name = r.unique_name.as_deref().unwrap_or(&r.type_name);
            if r.desc.is_empty() {
                format!("You are in {}.", name)
            } else {
                format!("You are in {}. {}", name, r.desc)
            }
        }
        (Some(r), Language::Ja) => {
            let name = r.unique_name.as_deref().unwrap_or(&r.type_name);
            if r.desc.is_empty() {
                format!("あなたは{}にいます。", name)
            } else {
                format!("あなたは{}にいます。{}", name, r.desc)
            }
        }
        (None, Language::En) => "You are not inside any known region.".to_string(),
        (None, Language::Ja) => "既知の領域の外にいます。".to_string(),
    }
}

/// Region line followed by one line per visible entity.
pub fn view_prompt(region: Option<&Region>, records: &[ViewRecord], lang: Language) -> String {
    let mut lines = vec![describe_region(region, lang)];
    if records.is_empty() {
        lines.push(match lang {
            Language::En => "Nothing notable is in view.".to_string(),
            Language::Ja => "特に目立つものは見えません。".to_string(),
        });
    } else {
        lines.extend(describe_view(records, lang));
    }
    lines.join("\n")
}

fn describe_record(record: &ViewRecord, lang: Language) -> String {
    let name = record.display_name();
    match lang {
        Language::En => {
            let kind = if record.is_region() { "Area" } else { "Object" };
            let desc = if record.desc.is_empty() {
                String::new()
            } else {
                format!(" ({})", record.desc)
            };
            format!("{} {}{}: {}.", kind, name, desc, placement_en(record))
        }
        Language::Ja => {
            let kind = if record.is_region() { "エリア" } else { "物" };
            let desc = if record.desc.is_empty() {
                String::new()
            } else {
                format!("（{}）", record.desc)
            };
            format!("{}「{}」{}: {}", kind, name, desc, placement_ja(record))
        }
    }
}

fn placement_en(record: &ViewRecord) -> String {
    match (record.cam_pos, record.cam_dist) {
        (_, CamDist::Unknown) => "somewhere inside its area".to_string(),
        (CamPos::None, _) if record.dist < 1.0 => "right here".to_string(),
        (CamPos::None, _) => "out of sight".to_string(),
        (pos, dist) => {
            let direction = match pos {
                CamPos::Front => "in front of you",
                CamPos::Upper => "above you",
                CamPos::Lower => "below you",
                CamPos::Left => "to your left",
                CamPos::Right => "to your right",
                CamPos::UpperRight => "up to your right",
                CamPos::UpperLeft => "up to your left",
                CamPos::LowerRight => "down to your right",
                CamPos::LowerLeft => "down to your left",
                CamPos::None => "",
            };
            format!("{}, {}", dist.as_str(), direction)
        }
    }
}

fn placement_ja(record: &ViewRecord) -> String {
    match (record.cam_pos, record.cam_dist) {
        (_, CamDist::Unknown) => "エリア内のどこかにあります。".to_string(),
        (CamPos::None, _) if record.dist < 1.0 => "ここにあります。".to_string(),
        (CamPos::None, _) => "見えない位置にあります。".to_string(),
        (pos, dist) => {
            let distance = match dist {
                CamDist::VeryClose => "すぐ近く",
                CamDist::Close => "近く",
                CamDist::InDistance => "少し離れた",
                CamDist::VeryFarAway | CamDist::Unknown => "遠く",
            };
            let direction = match pos {
                CamPos::Front => "正面",
                CamPos::Upper => "上",
                CamPos::Lower => "下",
                CamPos::Left => "左",
                CamPos::Right => "右",
                CamPos::UpperRight => "右上",
                CamPos::UpperLeft => "左上",
                CamPos::LowerRight => "右下",
                CamPos::LowerLeft => "左下",
                CamPos::None => "",
            };
            format!("{}の{}にあります。", distance, direction)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::EntityKind;

    fn record(cam_pos: CamPos, cam_dist: CamDist, dist: f64) -> ViewRecord {
        ViewRecord {
            id: "lamp-1".into(),
            kind: Some(EntityKind::Object),
            type_name: "lamp".into(),
            unique_name: None,
            parent_region_id: Some("house".into()),
            has_object: false,
            desc: "a tall lamp".into(),
            dist,
            radius: 0.0,
            cam_pos,
            cam_dist,
            pos2d: [0.0, dist],
            pos3d: [0.0, dist, 0.0],
        }
    }

    #[test]
    fn test_language_codes() {
        assert_eq!(Language::from_code("ja"), Language::Ja);
        assert_eq!(Language::from_code("ja-JP"), Language::Ja);
        assert_eq!(Language::from_code("fr"), Language::En);
        assert_eq!(Language::from_code(""), Language::En);
    }

    #[test]
    fn test_describe_view_english() {
        let lines = describe_view(&[record(CamPos::Front, CamDist::VeryClose, 5.0)], Language::En);
        assert_eq!(lines, vec!["Object lamp (a tall lamp): very close, in front of you."]);

        let unknown = describe_view(&[record(CamPos::None, CamDist::Unknown, 0.0)], Language::En);
        assert!(unknown[0].contains("somewhere inside its area"));
    }

    #[test]
    fn test_describe_view_japanese() {
        let lines = describe_view(&[record(CamPos::UpperLeft, CamDist::Close, 50.0)], Language::Ja);
        assert_eq!(lines, vec!["物「lamp」（a tall lamp）: 近くの左上にあります。"]);
    }

    #[test]
    fn test_view_prompt_without_region_or_records() {
        let prompt = view_prompt(None, &[], Language::En);
        assert_eq!(
            prompt,
            "You are not inside any known region.\nNothing notable is in view."
        );
    }
}
