use crate::detect::Detection;

/// 没有任何类别匹配时使用的建议
pub const DEFAULT_SUGGESTION: &str =
    "Try to find a clear subject for your photo. What is the main story you want to tell with this image?";

/// 按类别给出的固定建议
const SUGGESTIONS: &[(&str, &str)] = &[
    (
        "person",
        "Consider the lighting on the person. Is it flattering? Natural light from a window is often a great choice.",
    ),
    ("car", "To make the car look more dynamic, try taking the photo from a lower angle."),
    (
        "chair",
        "If this is for a room design, think about the chair's placement. Does it invite conversation or block a path?",
    ),
    ("sofa", "A few throw pillows or a cozy blanket can make a sofa look much more inviting."),
    (
        "potted plant",
        "Ensure the plant is healthy and the pot is clean. It adds a touch of nature to the scene.",
    ),
    ("bed", "A neatly made bed with layered pillows can instantly make a bedroom look more put-together."),
    (
        "dining table",
        "A simple centerpiece, like a vase of flowers or a bowl of fruit, can elevate the look of a dining table.",
    ),
    (
        "tv",
        "Is the TV the focal point? If not, consider hiding it within a gallery wall or a cabinet to make the room feel less centered around electronics.",
    ),
    ("laptop", "For a clean desk setup, consider cable management solutions to hide wires."),
    (
        "book",
        "Stacking books horizontally with a small object on top can be more visually interesting than a simple row.",
    ),
    ("clock", "An interesting clock can be a piece of art. Does this one match the room's style?"),
];

/// 查询某个类别的建议
pub fn suggestion_for(label: &str) -> Option<&'static str> {
    SUGGESTIONS.iter().find(|(key, _)| *key == label).map(|(_, text)| *text)
}

/// 根据检测结果生成建议
///
/// 类别按首次出现的顺序去重，每个类别至多一条；没有任何类别命中时只返回默认建议
pub fn suggest(detections: &[Detection]) -> Vec<String> {
    let mut seen: Vec<&str> = vec![];
    let mut suggestions = vec![];
    for detection in detections {
        if seen.contains(&detection.label.as_str()) {
            continue;
        }
        seen.push(&detection.label);
        if let Some(text) = suggestion_for(&detection.label) {
            suggestions.push(text.to_string());
        }
    }
    if suggestions.is_empty() {
        suggestions.push(DEFAULT_SUGGESTION.to_string());
    }
    suggestions
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(label: &str) -> Detection {
        Detection { label: label.to_string(), confidence: 0.9, bbox: [0., 0., 1., 1.] }
    }

    #[test]
    fn empty_gets_default() {
        assert_eq!(suggest(&[]), vec![DEFAULT_SUGGESTION.to_string()]);
    }

    #[test]
    fn unknown_labels_get_default() {
        assert_eq!(suggest(&[det("giraffe"), det("kite")]), vec![DEFAULT_SUGGESTION.to_string()]);
    }

    #[test]
    fn deduplicates_in_order() {
        let result = suggest(&[det("car"), det("person"), det("car"), det("giraffe"), det("person")]);
        assert_eq!(result.len(), 2);
        assert_eq!(result[0], suggestion_for("car").unwrap());
        assert_eq!(result[1], suggestion_for("person").unwrap());
    }

    #[test]
    fn no_default_when_something_matches() {
        let result = suggest(&[det("giraffe"), det("tv")]);
        assert_eq!(result, vec![suggestion_for("tv").unwrap().to_string()]);
    }
}
