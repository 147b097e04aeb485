//! Fixed choices offered by the farewell flow.

pub const DEFAULT_THEME: &str = "过去的自己";
pub const DEFAULT_GOODBYE_TEXT: &str = "谢谢你曾经的陪伴，我会带着祝福继续前行。";
pub const DEFAULT_TOMB_STYLE: &str = "style1";
pub const MAX_THEME_CHARS: usize = 50;

pub const GREETING: &str = "你好，我在这里陪你完成这次告别。请告诉我你想要告别的是什么？";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FarewellKind {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TombStyle {
    pub id: &'static str,
    pub name: &'static str,
}

pub const FAREWELL_KINDS: [FarewellKind; 3] = [
    FarewellKind {
        id: "relationship",
        name: "关系",
        description: "一段友谊、爱情或亲情关系的结束",
    },
    FarewellKind {
        id: "experience",
        name: "经历",
        description: "工作、学习或生活阶段的结束",
    },
    FarewellKind {
        id: "emotion",
        name: "情绪",
        description: "消极情绪，如悲伤、愤怒、恐惧等",
    },
];

pub const TOMB_STYLES: [TombStyle; 4] = [
    TombStyle { id: "style1", name: "简约" },
    TombStyle { id: "style2", name: "传统" },
    TombStyle { id: "style3", name: "现代" },
    TombStyle { id: "style4", name: "艺术" },
];

/// Prompts shown while the session is still in the guiding phase.
pub const GUIDE_PROMPTS: [&str; 8] = [
    "回忆你们相遇的场景，以及当时的感受。",
    "如果能对过去的自己说一句话，你会说什么？",
    "你最感谢这段经历带给你的是什么？",
    "这段经历教会了你什么，让你成长的地方是？",
    "如果可以重来一次，你会做出什么不同的选择？",
    "曾经的感受，现在想来有什么不同吗？",
    "你希望未来的自己如何面对类似的情况？",
    "允许自己表达遗憾和不舍，你想说什么？",
];

pub fn farewell_kind(id: &str) -> Option<&'static FarewellKind> {
    FAREWELL_KINDS.iter().find(|k| k.id == id)
}

/// Unknown ids resolve to the first style.
pub fn tomb_style(id: &str) -> &'static TombStyle {
    TOMB_STYLES.iter().find(|s| s.id == id).unwrap_or(&TOMB_STYLES[0])
}
