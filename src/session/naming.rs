//! Picks a label for "who or what is being farewelled" from the first message.

struct NameRule {
    keywords: &'static [&'static str],
    label: &'static str,
}

// Within a table, earlier rules win, so longer keywords come first.
const RELATIONSHIP_RULES: &[NameRule] = &[
    NameRule { keywords: &["前男友"], label: "前男友" },
    NameRule { keywords: &["前女友"], label: "前女友" },
    NameRule { keywords: &["前任"], label: "前任" },
    NameRule { keywords: &["闺蜜"], label: "闺蜜" },
    NameRule { keywords: &["朋友", "友谊"], label: "朋友" },
    NameRule { keywords: &["爸爸", "父亲"], label: "爸爸" },
    NameRule { keywords: &["妈妈", "母亲"], label: "妈妈" },
    NameRule { keywords: &["爷爷"], label: "爷爷" },
    NameRule { keywords: &["奶奶"], label: "奶奶" },
    NameRule { keywords: &["宠物", "猫", "狗"], label: "宠物" },
];

const EXPERIENCE_RULES: &[NameRule] = &[
    NameRule { keywords: &["工作", "公司", "职场"], label: "那份工作" },
    NameRule { keywords: &["学校", "大学", "校园"], label: "校园时光" },
    NameRule { keywords: &["城市"], label: "那座城市" },
    NameRule { keywords: &["青春"], label: "青春" },
];

const EMOTION_RULES: &[NameRule] = &[
    NameRule { keywords: &["焦虑"], label: "焦虑" },
    NameRule { keywords: &["悲伤", "难过"], label: "悲伤" },
    NameRule { keywords: &["愤怒", "生气"], label: "愤怒" },
    NameRule { keywords: &["恐惧", "害怕"], label: "恐惧" },
    NameRule { keywords: &["遗憾"], label: "遗憾" },
    NameRule { keywords: &["孤独"], label: "孤独" },
];

fn rules_for(farewell_type: &str) -> &'static [NameRule] {
    match farewell_type {
        "relationship" => RELATIONSHIP_RULES,
        "experience" => EXPERIENCE_RULES,
        "emotion" => EMOTION_RULES,
        _ => &[],
    }
}

pub fn generic_label(farewell_type: &str) -> &'static str {
    match farewell_type {
        "relationship" => "那个人",
        "experience" => "那段经历",
        "emotion" => "那种情绪",
        _ => "过去的自己",
    }
}

pub fn infer_farewell_name(farewell_type: &str, text: &str) -> String {
    rules_for(farewell_type)
        .iter()
        .find(|rule| rule.keywords.iter().any(|k| text.contains(k)))
        .map(|rule| rule.label)
        .unwrap_or_else(|| generic_label(farewell_type))
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_selects_label() {
        assert_eq!(infer_farewell_name("relationship", "我想和前任告别"), "前任");
        assert_eq!(infer_farewell_name("relationship", "前男友离开三年了"), "前男友");
        assert_eq!(infer_farewell_name("experience", "辞掉了那家公司"), "那份工作");
        assert_eq!(infer_farewell_name("emotion", "总是很难过"), "悲伤");
    }

    #[test]
    fn no_match_uses_generic_label() {
        assert_eq!(infer_farewell_name("relationship", "你好"), "那个人");
        assert_eq!(infer_farewell_name("experience", "你好"), "那段经历");
        assert_eq!(infer_farewell_name("emotion", "你好"), "那种情绪");
        assert_eq!(infer_farewell_name("", "前任"), "过去的自己");
    }

    #[test]
    fn keywords_belong_to_their_type() {
        assert_eq!(infer_farewell_name("emotion", "我想和前任告别"), "那种情绪");
    }
}
