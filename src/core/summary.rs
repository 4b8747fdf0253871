use crate::config::SummarySettings;
use crate::metric::magnitude;
use crate::TraitVector;
use serde::Serialize;

const POSITIVE_TAGS: [&str; 30] = [
    "Outgoing", "Creative", "Harmonious", "Logical", "Expressive", "Dependable",
    "Adventurous", "Idealistic", "Sociable", "Optimistic", "Independent", "Devoted",
    "Innovative", "Patient", "Articulate", "Analytical", "Empathetic", "Proactive",
    "Open-minded", "Organized", "Intuitive", "Competitive", "Cooperative", "Free-spirited",
    "Practical", "Passionate", "Careful", "Flexible", "Traditional", "Progressive",
];

const NEGATIVE_TAGS: [&str; 30] = [
    "Reserved", "Pragmatic", "Individualist", "Instinctive", "Rational", "Easygoing",
    "Stability-seeking", "Realist", "Selective", "Cautious", "Agreeable", "Self-reliant",
    "Conservative", "Decisive", "Modest", "Gut-driven", "Objective", "Receptive",
    "Consistent", "Adaptable", "Methodical", "Supportive", "Autonomous", "Disciplined",
    "Dreamer", "Calm", "Bold", "Steady", "Inventive", "Classic",
];

const POSITIVE_DESCRIPTIONS: [&str; 30] = [
    "sociability", "creativity", "harmony", "logic", "emotional expression", "responsibility",
    "adventure", "ideals", "communication", "optimism", "independence", "devotion",
    "innovation", "persistence", "expressiveness", "analysis", "empathy", "initiative",
    "diversity", "planning", "intuition", "ambition", "cooperation", "freedom",
    "practicality", "passion", "prudence", "adaptability", "tradition", "progress",
];

const NEGATIVE_DESCRIPTIONS: [&str; 30] = [
    "introspection", "practice", "autonomy", "instinct", "reason", "spontaneity",
    "stability", "realism", "selectivity", "caution", "accord", "self-reliance",
    "convention", "decisiveness", "modesty", "gut feeling", "objectivity", "receptiveness",
    "consistency", "flexibility", "method", "support", "individuality", "discipline",
    "imagination", "composure", "boldness", "steadiness", "reinvention", "heritage",
];

const FALLBACK_HEADLINE: &str = "Looking for new connections";
const BALANCED_SUMMARY: &str = "Well-balanced personality.";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileSummary {
    pub tags: Vec<String>,
    pub headline: String,
    pub summary_text: String,
    pub confidence: f32,
}

#[derive(Debug, Clone, Copy)]
struct Trait {
    axis: usize,
    strength: f32,
    positive: bool,
}

impl Trait {
    fn tag(&self) -> &'static str {
        if self.positive {
            POSITIVE_TAGS[self.axis]
        } else {
            NEGATIVE_TAGS[self.axis]
        }
    }

    fn description(&self) -> &'static str {
        if self.positive {
            POSITIVE_DESCRIPTIONS[self.axis]
        } else {
            NEGATIVE_DESCRIPTIONS[self.axis]
        }
    }

    fn intensifier(&self) -> Option<&'static str> {
        if self.strength > 0.8 {
            Some("highly")
        } else if self.strength > 0.6 {
            Some("very")
        } else if self.strength > 0.4 {
            Some("somewhat")
        } else {
            None
        }
    }
}

/// Turns a 30D trait vector into display tags, a headline, and a short text.
#[derive(Debug, Clone)]
pub struct SummaryGenerator {
    settings: SummarySettings,
}

impl SummaryGenerator {
    pub fn new(settings: SummarySettings) -> Self {
        Self { settings }
    }

    pub fn summarize(&self, vector: &TraitVector) -> ProfileSummary {
        let traits = self.significant_traits(vector);
        ProfileSummary {
            tags: self.tags_from(&traits),
            headline: Self::headline_from(&traits),
            summary_text: self.text_from(&traits),
            confidence: Self::confidence_from(vector, traits.len()),
        }
    }

    pub fn tags(&self, vector: &TraitVector) -> Vec<String> {
        self.tags_from(&self.significant_traits(vector))
    }

    pub fn headline(&self, vector: &TraitVector) -> String {
        Self::headline_from(&self.significant_traits(vector))
    }

    /// Axes at or above the significance threshold, strongest first.
    fn significant_traits(&self, vector: &TraitVector) -> Vec<Trait> {
        let mut traits: Vec<Trait> = vector
            .iter()
            .enumerate()
            .filter(|(_, v)| v.abs() >= self.settings.significance_threshold)
            .map(|(axis, &v)| Trait {
                axis,
                strength: v.abs(),
                positive: v > 0.0,
            })
            .collect();
        traits.sort_by(|a, b| b.strength.total_cmp(&a.strength));
        traits
    }

    fn tags_from(&self, traits: &[Trait]) -> Vec<String> {
        let mut tags: Vec<String> = Vec::with_capacity(self.settings.max_tags);
        for t in traits {
            if tags.len() >= self.settings.max_tags {
                break;
            }
            let tag = t.tag();
            if !tags.iter().any(|existing| existing == tag) {
                tags.push(tag.to_string());
            }
        }
        tags
    }

    fn headline_from(traits: &[Trait]) -> String {
        match traits.first() {
            Some(primary) => format!("Values {}", primary.description()),
            None => FALLBACK_HEADLINE.to_string(),
        }
    }

    fn text_from(&self, traits: &[Trait]) -> String {
        if traits.is_empty() {
            return BALANCED_SUMMARY.to_string();
        }
        let sentences: Vec<String> = traits
            .iter()
            .take(self.settings.max_sentences.max(1))
            .map(|t| match t.intensifier() {
                Some(intensifier) => format!("Values {} {} approach", intensifier, t.description()),
                None => format!("Values {} approach", t.description()),
            })
            .collect();
        format!("{}.", sentences.join(". "))
    }

    fn confidence_from(vector: &TraitVector, significant: usize) -> f32 {
        let norm = magnitude(vector).clamp(0.0, 1.0);
        let diversity = (significant as f32 / 10.0).clamp(0.0, 1.0);
        (norm + diversity) * 0.5
    }
}

impl Default for SummaryGenerator {
    fn default() -> Self {
        Self::new(SummarySettings::default())
    }
}
