//! Question source for the host driver
//!
//! A small built-in bank, optionally replaced by a JSON file of the form
//! `[{"category": "...", "difficulty": "easy", "prompt": "...",
//! "options": ["..", ".."], "correct": 0}]`.

use crate::error::ClientError;
use log::{info, warn};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Deserialize;
use shared::{Difficulty, Question, Settings};
use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BankEntry {
    pub category: String,
    pub difficulty: Difficulty,
    pub prompt: String,
    pub options: Vec<String>,
    pub correct: usize,
}

impl BankEntry {
    fn question(&self) -> Question {
        Question {
            prompt: self.prompt.clone(),
            options: self.options.clone(),
            correct_option_index: self.correct,
        }
    }

    fn matches(&self, settings: &Settings) -> bool {
        self.category.eq_ignore_ascii_case(&settings.category)
            && self.difficulty == settings.difficulty
    }
}

#[derive(Debug, Clone)]
pub struct QuestionBank {
    entries: Vec<BankEntry>,
}

impl QuestionBank {
    pub fn new(entries: Vec<BankEntry>) -> Result<Self, ClientError> {
        if entries.is_empty() {
            return Err(ClientError::QuestionBank("no questions".to_string()));
        }
        for (i, entry) in entries.iter().enumerate() {
            entry
                .question()
                .validate()
                .map_err(|e| ClientError::QuestionBank(format!("entry {}: {}", i, e)))?;
        }
        Ok(Self { entries })
    }

    pub fn from_json_str(json: &str) -> Result<Self, ClientError> {
        let entries: Vec<BankEntry> = serde_json::from_str(json)?;
        Self::new(entries)
    }

    pub fn load(path: &Path) -> Result<Self, ClientError> {
        let json = std::fs::read_to_string(path)?;
        let bank = Self::from_json_str(&json)?;
        info!("Loaded {} questions from {}", bank.len(), path.display());
        Ok(bank)
    }

    pub fn builtin() -> Self {
        let entries = BUILTIN
            .iter()
            .map(|(category, difficulty, prompt, options, correct)| BankEntry {
                category: category.to_string(),
                difficulty: *difficulty,
                prompt: prompt.to_string(),
                options: options.iter().map(|o| o.to_string()).collect(),
                correct: *correct,
            })
            .collect();
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn eligible<'a>(&'a self, settings: &'a Settings) -> impl Iterator<Item = &'a BankEntry> + 'a {
        self.entries
            .iter()
            .filter(move |e| !settings.modifiers.two_option_only || e.options.len() == 2)
    }

    /// Picks questions for a new game.
    ///
    /// Prefers entries matching category and difficulty and tops up from the
    /// rest of the bank when there are too few. May return fewer than asked
    /// if the whole bank is smaller.
    pub fn select<R: Rng>(&self, settings: &Settings, rng: &mut R) -> Vec<Question> {
        let wanted = settings.num_questions as usize;

        let (mut preferred, mut fallback): (Vec<&BankEntry>, Vec<&BankEntry>) =
            self.eligible(settings).partition(|e| e.matches(settings));
        if settings.modifiers.shuffle_questions {
            preferred.shuffle(rng);
            fallback.shuffle(rng);
        }

        if preferred.len() < wanted {
            warn!(
                "Only {} {} questions in category '{}'; filling from the rest of the bank",
                preferred.len(),
                settings.difficulty,
                settings.category
            );
        }

        preferred
            .into_iter()
            .chain(fallback)
            .take(wanted)
            .map(BankEntry::question)
            .collect()
    }

    /// Draws one question whose prompt is not in `used`
    pub fn draw<R: Rng>(
        &self,
        settings: &Settings,
        used: &HashSet<String>,
        rng: &mut R,
    ) -> Option<Question> {
        let fresh: Vec<&BankEntry> = self
            .eligible(settings)
            .filter(|e| !used.contains(&e.prompt))
            .collect();
        let preferred: Vec<&BankEntry> = fresh
            .iter()
            .copied()
            .filter(|e| e.matches(settings))
            .collect();

        let pool = if preferred.is_empty() { fresh } else { preferred };
        pool.choose(rng).map(|e| e.question())
    }
}

impl Default for QuestionBank {
    fn default() -> Self {
        Self::builtin()
    }
}

type BuiltinEntry = (&'static str, Difficulty, &'static str, &'static [&'static str], usize);

#[rustfmt::skip]
const BUILTIN: &[BuiltinEntry] = &[
    ("general", Difficulty::Easy, "How many days are in a leap year?", &["364", "365", "366", "367"], 2),
    ("general", Difficulty::Easy, "A spider has eight legs.", &["True", "False"], 0),
    ("general", Difficulty::Medium, "Which metal is liquid at room temperature?", &["Mercury", "Gallium", "Lead", "Tin"], 0),
    ("general", Difficulty::Medium, "How many keys are on a standard piano?", &["76", "88", "92", "104"], 1),
    ("general", Difficulty::Medium, "The Great Wall of China is visible from the Moon with the naked eye.", &["True", "False"], 1),
    ("general", Difficulty::Medium, "Which language has the most native speakers?", &["English", "Spanish", "Hindi", "Mandarin Chinese"], 3),
    ("general", Difficulty::Hard, "In which year did the first person walk on the Moon?", &["1965", "1969", "1971", "1973"], 1),
    ("general", Difficulty::Hard, "What is the smallest prime number greater than 100?", &["101", "103", "107", "109"], 0),
    ("science", Difficulty::Easy, "What gas do plants absorb from the air?", &["Oxygen", "Nitrogen", "Carbon dioxide", "Helium"], 2),
    ("science", Difficulty::Easy, "Sound travels faster in water than in air.", &["True", "False"], 0),
    ("science", Difficulty::Medium, "What is the chemical symbol for sodium?", &["So", "Sd", "Na", "S"], 2),
    ("science", Difficulty::Medium, "Which planet has the shortest day?", &["Earth", "Jupiter", "Mars", "Mercury"], 1),
    ("science", Difficulty::Hard, "What particle mediates the electromagnetic force?", &["Gluon", "W boson", "Photon", "Graviton"], 2),
    ("science", Difficulty::Hard, "Diamonds are made of carbon.", &["True", "False"], 0),
    ("geography", Difficulty::Easy, "What is the capital of Japan?", &["Kyoto", "Osaka", "Tokyo", "Sapporo"], 2),
    ("geography", Difficulty::Easy, "Australia is both a country and a continent.", &["True", "False"], 0),
    ("geography", Difficulty::Medium, "Which river flows through Budapest?", &["Danube", "Rhine", "Vistula", "Elbe"], 0),
    ("geography", Difficulty::Medium, "Which country has the most time zones?", &["Russia", "United States", "France", "China"], 2),
    ("geography", Difficulty::Hard, "What is the highest capital city in the world?", &["Quito", "La Paz", "Bogota", "Thimphu"], 1),
    ("geography", Difficulty::Hard, "Lake Baikal is the deepest lake on Earth.", &["True", "False"], 0),
];

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn settings(category: &str, difficulty: Difficulty, num_questions: u32) -> Settings {
        Settings {
            category: category.to_string(),
            difficulty,
            num_questions,
            ..Settings::default()
        }
    }

    #[test]
    fn test_builtin_bank_is_valid() {
        let bank = QuestionBank::builtin();
        assert!(!bank.is_empty());
        for entry in &bank.entries {
            assert!(entry.question().validate().is_ok(), "{}", entry.prompt);
        }
    }

    #[test]
    fn test_select_prefers_matching_entries() {
        let bank = QuestionBank::builtin();
        let mut rng = StdRng::seed_from_u64(7);
        let picked = bank.select(&settings("science", Difficulty::Easy, 2), &mut rng);

        assert_eq!(picked.len(), 2);
        let science_easy: Vec<&str> = bank
            .entries
            .iter()
            .filter(|e| e.category == "science" && e.difficulty == Difficulty::Easy)
            .map(|e| e.prompt.as_str())
            .collect();
        for question in &picked {
            assert!(science_easy.contains(&question.prompt.as_str()));
        }
    }

    #[test]
    fn test_select_tops_up_from_other_entries() {
        let bank = QuestionBank::builtin();
        let mut rng = StdRng::seed_from_u64(1);
        let picked = bank.select(&settings("science", Difficulty::Hard, 6), &mut rng);
        assert_eq!(picked.len(), 6);

        let unique: HashSet<&str> = picked.iter().map(|q| q.prompt.as_str()).collect();
        assert_eq!(unique.len(), 6);
    }

    #[test]
    fn test_two_option_modifier() {
        let bank = QuestionBank::builtin();
        let mut rng = StdRng::seed_from_u64(3);
        let mut only_two = settings("general", Difficulty::Medium, 4);
        only_two.modifiers.two_option_only = true;

        for question in bank.select(&only_two, &mut rng) {
            assert_eq!(question.options.len(), 2);
        }
    }

    #[test]
    fn test_draw_skips_used_prompts() {
        let bank = QuestionBank::builtin();
        let mut rng = StdRng::seed_from_u64(5);
        let wanted = settings("geography", Difficulty::Hard, 1);

        let mut used = HashSet::new();
        for _ in 0..bank.len() {
            let question = bank.draw(&wanted, &used, &mut rng).unwrap();
            assert!(used.insert(question.prompt));
        }
        assert_eq!(bank.draw(&wanted, &used, &mut rng), None);
    }

    #[test]
    fn test_json_bank() {
        let json = r#"[
            {"category": "music", "difficulty": "easy", "prompt": "Notes in an octave?",
             "options": ["7", "8", "12", "5"], "correct": 2}
        ]"#;
        let bank = QuestionBank::from_json_str(json).unwrap();
        assert_eq!(bank.len(), 1);
    }

    #[test]
    fn test_json_bank_rejects_bad_entries() {
        let three_options = r#"[
            {"category": "x", "difficulty": "hard", "prompt": "?",
             "options": ["a", "b", "c"], "correct": 0}
        ]"#;
        assert!(matches!(
            QuestionBank::from_json_str(three_options),
            Err(ClientError::QuestionBank(_))
        ));
        assert!(matches!(
            QuestionBank::from_json_str("not json"),
            Err(ClientError::Json(_))
        ));
        assert!(matches!(
            QuestionBank::from_json_str("[]"),
            Err(ClientError::QuestionBank(_))
        ));
    }
}
