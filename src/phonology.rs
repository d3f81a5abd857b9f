pub const PAD: &str = "<pad>";
pub const UNK: &str = "<unk>";
pub const SIL: &str = "<sil>";
pub const SPN: &str = "<spn>";

pub const WAV_FRAME_RATE: u32 = 16_000;

pub const VOCAB_ARPABET: &[(&str, u32)] = &[
    (PAD, 0),
    ("AA", 1),
    ("AE", 2),
    ("AH", 3),
    ("AO", 4),
    ("AW", 5),
    ("AY", 6),
    ("B", 7),
    ("CH", 8),
    ("D", 9),
    ("DH", 10),
    ("DX", 11),
    ("EH", 12),
    ("ER", 13),
    ("EY", 14),
    ("F", 15),
    ("G", 16),
    ("HH", 17),
    ("IH", 18),
    ("IY", 19),
    ("JH", 20),
    ("K", 21),
    ("L", 22),
    ("M", 23),
    ("N", 24),
    ("NG", 25),
    ("OW", 26),
    ("OY", 27),
    ("P", 28),
    ("R", 29),
    ("S", 30),
    ("SH", 31),
    ("T", 32),
    ("TH", 33),
    ("UH", 34),
    ("UW", 35),
    ("V", 36),
    ("W", 37),
    ("Y", 38),
    ("Z", 39),
    ("ZH", 40),
    (SIL, 41),
    (SPN, 42),
    (UNK, 43),
];

pub const PROMPTS_BNT: &[&str] = &[
    "house",
    "comb",
    "toothbrush",
    "octopus",
    "bench",
    "volcano",
    "canoe",
    "beaver",
    "cactus",
    "hammock",
    "stethoscope",
    "unicorn",
    "tripod",
    "sphinx",
    "palette",
];

pub const PROMPTS_VNT: &[&str] = &[
    "cut", "bark", "put", "send", "drive", "wash", "read", "laugh", "watch", "give", "swim",
    "stir", "pinch", "crawl", "deliver", "pour", "howl", "throw", "bite", "shove", "tickle",
    "shave",
];

pub fn vocab_index(symbol: &str) -> Option<u32> {
    VOCAB_ARPABET
        .iter()
        .find(|(candidate, _)| *candidate == symbol)
        .map(|(_, index)| *index)
}

pub fn encode_transcript(transcript: &str) -> Vec<u32> {
    let unk = vocab_index(UNK).unwrap_or_default();
    transcript
        .split_whitespace()
        .map(|symbol| vocab_index(symbol).unwrap_or(unk))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vocab_is_dense() {
        for (position, (_, index)) in VOCAB_ARPABET.iter().enumerate() {
            assert_eq!(position as u32, *index);
        }
        assert_eq!(VOCAB_ARPABET.len(), 44);
    }

    #[test]
    fn encode_maps_unknown_symbols() {
        assert_eq!(encode_transcript("HH AW S"), vec![17, 5, 30]);
        assert_eq!(encode_transcript("<sil> XX"), vec![41, 43]);
    }

    #[test]
    fn prompt_counts() {
        assert_eq!(PROMPTS_BNT.len(), 15);
        assert_eq!(PROMPTS_VNT.len(), 22);
    }
}
