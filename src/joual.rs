//! Local pattern-based responder used when the text provider is unavailable.
//!
//! Everything here is pure CPU work over static tables: no I/O, no remote
//! calls, and every public operation returns a usable answer. That makes the
//! generator safe to use as a breaker fallback.

use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tracing::{debug, error};

use crate::provider::ProviderError;

/// Confidence attached to a successful pattern match.
pub const PATTERN_CONFIDENCE: f64 = 0.75;

/// Confidence attached to the apology returned when generation itself fails.
pub const APOLOGY_CONFIDENCE: f64 = 0.5;

const APOLOGY: &str = "Yo, désolé! Mes circuits sont un peu gelés là. Réessaie tantôt!";

/// Topics the local responder knows how to talk about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Hellos, and anything nothing else matched.
    Greeting,
    /// Thanks in French or English.
    Thanks,
    /// Yes, yup, ouais.
    Affirmative,
    /// No, nope, nah.
    Negative,
    /// Poutine and its ingredients.
    Poutine,
    /// The Canadiens and hockey in general.
    Hockey,
    /// Fête nationale on June 24.
    SaintJean,
    /// Cold, snow, sun and rain.
    Weather,
    /// The city and its neighbourhoods.
    Montreal,
}

impl Topic {
    fn responses(self) -> &'static [&'static str] {
        match self {
            Topic::Greeting => &[
                "Yo! Comment ça va?",
                "Allô! Ça va bien?",
                "Quoi de neuf?",
                "Yo, mon ami!",
            ],
            Topic::Thanks => &[
                "Pas de problème, mon ami!",
                "C'est correct, content de pouvoir aider!",
                "De rien, y'a pas de quoi!",
                "C'est mon plaisir!",
            ],
            Topic::Affirmative => &[
                "Oui oui, 100%!",
                "Yup, certain!",
                "Absolument, mon gars!",
                "Ben oui, voyons!",
                "C'est ça, oui!",
            ],
            Topic::Negative => &[
                "Non non, pas du tout.",
                "Nope, c'est pas ça.",
                "Meh, pas vraiment.",
                "Ben non, tu sais.",
                "Là, non, pas vraiment.",
            ],
            Topic::Poutine => &[
                "Ah man, une bonne poutine du Parc La Fontaine, ça tu peux pas battre!",
                "Une poutine bien chaude avec de la sauce brune? C'est du pure gold.",
                "Les fries bien croustillantes, le fromage qui dégouline, c'est ça l'vrai vivre!",
                "Une vraie poutine québécoise, mon ami, c'est pas pareil des autres.",
            ],
            Topic::Hockey => &[
                "Les Canadiens! Même quand ils perdent, on les aime, tu sais.",
                "Hockey sur glace, c'est le sport du Québec, man. C'est dans notre sang.",
                "Une bonne game en hiver, avec des amis, une bière frette... c'est ça la vie!",
                "Les Habs, les Habs! C'est notre histoire, notre fierté!",
            ],
            Topic::SaintJean => &[
                "La Saint-Jean, c'est THE party, ami! Tout le Québec dans les rues!",
                "Le 24 juin, c'est notre fête! Fleur de lys en couleur!",
                "Saint-Jean, c'est l'party, c'est la musique, c'est l'fierté québécoise!",
                "T'es pas au Québec si tu as pas été à une Saint-Jean!",
            ],
            Topic::Weather => &[
                "C'est fret en tabarnak aujourd'hui! Vas-tu chercher ton manteau?",
                "Du beau soleil! Parfait pour une sortie dehors!",
                "Il pleut à seau! C'est un bon jour pour rester chez nous.",
                "L'hiver c'est froid mais on aime ça!",
            ],
            Topic::Montreal => &[
                "Montréal, c'est la plus grande ville du Québec, man!",
                "Le Plateau, Griffintown, le Vieux-Montréal... Montréal c'est tellement cool!",
                "Y'a rien comme Montréal en été sur le Mont-Royal!",
                "Montréal c'est multiculturel, c'est vibrant, c'est chez nous!",
            ],
        }
    }
}

static TOPIC_RULES: Lazy<Vec<(Regex, Topic)>> = Lazy::new(|| {
    [
        (r"poutine|fries|gravy|fromage", Topic::Poutine),
        (r"hockey|canadiens|habs|\bgame\b|score", Topic::Hockey),
        (r"saint-jean|st-jean|24 juin|fête|québécoise", Topic::SaintJean),
        (r"merci|thanks|\bthx\b", Topic::Thanks),
        (r"\boui\b|\byes\b|\byup\b|ouais", Topic::Affirmative),
        (r"\bnon\b|\bnope\b|\bnah\b", Topic::Negative),
        (
            r"montréal|montreal|mont-royal|plateau|vieux|griffintown",
            Topic::Montreal,
        ),
        (
            r"froid|neige|hiver|été|soleil|pluie|météo",
            Topic::Weather,
        ),
        (r"bonjour|salut|allo|allô|\byo\b|\bhey\b", Topic::Greeting),
    ]
    .into_iter()
    .filter_map(|(pattern, topic)| Regex::new(pattern).ok().map(|re| (re, topic)))
    .collect()
});

static FOOD_TOPIC: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?i)poutine|manger|bouffe|food|resto|restaurant").ok());

/// Classifies `input`, defaulting to [`Topic::Greeting`].
pub fn detect_topic(input: &str) -> Topic {
    let lower = input.to_lowercase();
    TOPIC_RULES
        .iter()
        .find(|(pattern, _)| pattern.is_match(&lower))
        .map(|(_, topic)| *topic)
        .unwrap_or(Topic::Greeting)
}

/// Caption tone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    /// Playful, with emoji.
    #[default]
    Fun,
    /// Calm and relaxed.
    Chill,
    /// All caps excitement.
    Hype,
    /// Jokes. Parses from both `drole` and `drôle`.
    Drole,
}

impl Tone {
    /// Lower-case tone name, as used in prompts.
    pub fn as_str(self) -> &'static str {
        match self {
            Tone::Fun => "fun",
            Tone::Chill => "chill",
            Tone::Hype => "hype",
            Tone::Drole => "drole",
        }
    }

    fn captions(self, food: bool) -> &'static [&'static str] {
        match (self, food) {
            (Tone::Fun, false) => &[
                "Yo! Regarde ça! 🔥",
                "Haha, trop cool! 😎",
                "Yo man, check ça out! 🤷‍♂️",
                "C'est fou! T'aimes tu ça? 💯",
            ],
            (Tone::Fun, true) => &[
                "Une poutine pour les champions! 🍟",
                "Ça c'est du manger! 🤤",
                "Yo! La bouffe du Québec c'est ça! 🍽️",
                "Un bon repas, y'a rien de mieux! 👨‍🍳",
            ],
            (Tone::Chill, false) => &[
                "Juste un beau moment, tu sais?",
                "Ça, c'est la vie qu'on aime.",
                "Cool et relax, exactement comme on l'aime.",
                "Un jour parfait pour checker ça.",
            ],
            (Tone::Chill, true) => &[
                "Une bonne bouffe tranquille.",
                "Manger bien, c'est comme méditer.",
                "Y'a pas plus zen que ça.",
                "Juste profiter de l'moment.",
            ],
            (Tone::Hype, false) => &[
                "YOOOOO! C'EST FOU! 🔥🔥🔥",
                "OMG! CHECK ÇA! 🚀",
                "TROP MALADE! 🎉",
                "C'EST THE BEST! 💪",
            ],
            (Tone::Hype, true) => &[
                "LA MEILLEURE POUTINE EVER! 🍟🔥",
                "BOUFFE DE DIEU! 🙏",
                "C'EST INSANE! 🤯",
                "GOÛTE ÇA! T'VAS DEVENIR FOU! 😻",
            ],
            (Tone::Drole, false) => &[
                "Haha check ça, tu vas rire! 😂",
                "C'est tellement drôle, tu sais?",
                "J'ai pas pu me retenir de rire! 😹",
                "Ça va te plaire, c'est le fun! 🤣",
            ],
            (Tone::Drole, true) => &[
                "La poutine qui gronde mon estomac! 😂",
                "Du manger tellement bon que tu vas virer fou! 🤪",
                "Oublie ta diète, c'est l'moment! 😆",
                "Ça fait rire mon ventre tellement c'est bon! 😋",
            ],
        }
    }
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tone {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fun" => Ok(Tone::Fun),
            "chill" => Ok(Tone::Chill),
            "hype" => Ok(Tone::Hype),
            "drole" | "drôle" => Ok(Tone::Drole),
            other => Err(format!("unknown tone '{}'", other)),
        }
    }
}

const TAG_POOL: [&str; 15] = [
    "#YoQuébec",
    "#Joual",
    "#TiGuy",
    "#Montréal",
    "#Québec",
    "#QuebecAtHome",
    "#Poutine",
    "#SaintJean",
    "#Canadiens",
    "#Montreal",
    "#QcLife",
    "#BelleProvince",
    "#Zyeuté",
    "#LaMtl",
    "#TrueQuébécois",
];

const TOPIC_TAGS: [(&[&str], [&str; 2]); 3] = [
    (&["poutine"], ["#PoutineLife", "#FriesForLife"]),
    (&["hockey"], ["#GoHabs", "#HockeyLife"]),
    (
        &["mont-royal", "montréal", "montreal"],
        ["#MontRoyalVibes", "#TheMtl"],
    ),
];

/// A locally generated answer.
#[derive(Debug, Clone, Serialize)]
pub struct LocalResponse {
    /// Response text.
    pub content: String,
    /// Always true: marks the answer as produced without a remote model.
    pub is_local: bool,
    /// [`PATTERN_CONFIDENCE`] on a pattern match, [`APOLOGY_CONFIDENCE`] otherwise.
    pub confidence: f64,
    /// When the answer was produced.
    pub generated_at: SystemTime,
}

#[derive(Debug)]
struct EmptyTable(Topic);

/// Pattern-based Joual responder with an explicit, seedable RNG.
pub struct JoualBee {
    rng: Mutex<StdRng>,
}

impl Default for JoualBee {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for JoualBee {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoualBee").finish_non_exhaustive()
    }
}

impl JoualBee {
    /// Creates a responder seeded from system entropy.
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Creates a responder whose choices are reproducible for a given seed.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Creates a responder from an optional seed.
    pub fn from_seed(seed: Option<u64>) -> Self {
        seed.map_or_else(Self::new, Self::with_seed)
    }

    fn pick(&self, options: &'static [&'static str]) -> Option<&'static str> {
        options.choose(&mut *self.rng.lock()).copied()
    }

    fn try_respond(&self, input: &str) -> Result<(Topic, &'static str), EmptyTable> {
        let topic = detect_topic(input);
        let content = self.pick(topic.responses()).ok_or(EmptyTable(topic))?;
        Ok((topic, content))
    }

    /// Answers `input` from the canned table of its topic.
    ///
    /// Never fails: if generation itself goes wrong the caller gets a generic
    /// apology with [`APOLOGY_CONFIDENCE`].
    pub fn generate_response(&self, input: &str) -> LocalResponse {
        match self.try_respond(input) {
            Ok((topic, content)) => {
                debug!(?topic, "generated local response");
                LocalResponse {
                    content: content.to_string(),
                    is_local: true,
                    confidence: PATTERN_CONFIDENCE,
                    generated_at: SystemTime::now(),
                }
            }
            Err(EmptyTable(topic)) => {
                error!(?topic, "no local responses for topic");
                LocalResponse {
                    content: APOLOGY.to_string(),
                    is_local: true,
                    confidence: APOLOGY_CONFIDENCE,
                    generated_at: SystemTime::now(),
                }
            }
        }
    }

    /// Picks a caption for `topic` in the given tone.
    pub fn generate_caption(&self, topic: &str, tone: Tone) -> String {
        let food = FOOD_TOPIC
            .as_ref()
            .is_some_and(|pattern| pattern.is_match(topic));
        self.pick(tone.captions(food))
            .or_else(|| self.pick(Tone::Fun.captions(false)))
            .unwrap_or("Yo! Regarde ça!")
            .to_string()
    }

    /// Returns up to `count` shuffled hashtags, with topic-specific tags
    /// added to the pool when the topic mentions them.
    pub fn generate_hashtags(&self, topic: &str, count: usize) -> Vec<String> {
        let lower = topic.to_lowercase();
        let mut pool: SmallVec<[&str; 24]> = TAG_POOL.iter().copied().collect();
        for (keywords, tags) in TOPIC_TAGS {
            if keywords.iter().any(|keyword| lower.contains(keyword)) {
                pool.extend(tags);
            }
        }

        pool.shuffle(&mut *self.rng.lock());
        pool.into_iter().take(count).map(str::to_string).collect()
    }
}

/// Produces a local answer when the text provider cannot.
///
/// The swarm adapter runs this as the text breaker's fallback. An error here
/// makes the adapter drop to its last-resort answer.
pub trait LocalResponder: Send + Sync + 'static {
    /// Answers `prompt` without any remote call.
    fn respond(&self, prompt: &str) -> Result<String, ProviderError>;
}

impl LocalResponder for JoualBee {
    fn respond(&self, prompt: &str) -> Result<String, ProviderError> {
        Ok(self.generate_response(prompt).content)
    }
}
