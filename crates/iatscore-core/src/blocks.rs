//! Construction of the canonical 7-block IAT design.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::IatError;
use crate::model::{
    Block, BlockKind, LabelSource, Side, SidedLabels, Stimulus, StimulusKind, TestConfig,
};

/// Number of blocks in the canonical design.
pub const BLOCK_COUNT: usize = BlockKind::CANONICAL_SEQUENCE.len();

/// A label before it is placed in a block.
#[derive(Debug, Clone)]
struct Item {
    text: String,
    source: LabelSource,
    side: Side,
}

fn items(labels: &SidedLabels, source: LabelSource, side: Side) -> impl Iterator<Item = Item> + '_ {
    labels.side(side).iter().map(move |text| Item {
        text: text.clone(),
        source,
        side,
    })
}

fn require_labels(config: &TestConfig) -> Result<(), IatError> {
    for (name, labels) in [
        ("categories", &config.categories),
        ("attributes", &config.attributes),
    ] {
        for side in Side::BOTH {
            if labels.side(side).is_empty() {
                return Err(IatError::InvalidConfig(format!(
                    "{name}.{side} must contain at least one label"
                )));
            }
        }
    }
    Ok(())
}

/// Union of every category and attribute label, each tagged with the side that owns it.
fn combined_items(config: &TestConfig) -> Vec<Item> {
    let mut all = Vec::with_capacity(config.categories.len() + config.attributes.len());
    for (labels, source) in [
        (&config.categories, LabelSource::Category),
        (&config.attributes, LabelSource::Attribute),
    ] {
        for side in Side::BOTH {
            all.extend(items(labels, source, side));
        }
    }
    all
}

fn number(items: Vec<Item>, block_number: u32, combined: bool) -> Vec<Stimulus> {
    items
        .into_iter()
        .zip(1u32..)
        .map(|(item, trial_number)| {
            let kind = match (combined, item.source) {
                (true, _) => StimulusKind::Combined(item.side),
                (false, LabelSource::Category) => StimulusKind::Category(item.side),
                (false, LabelSource::Attribute) => StimulusKind::Attribute(item.side),
            };
            Stimulus {
                text: item.text,
                source: item.source,
                kind,
                block_number,
                trial_number,
            }
        })
        .collect()
}

fn instruction_key(kind: BlockKind) -> &'static str {
    match kind {
        _ if kind.is_reverse() => "reverse",
        BlockKind::PracticeCategories(Side::Right) => "reverse",
        BlockKind::TestCombined(_) => "test",
        _ => "practice",
    }
}

/// Generate the seven blocks for `config`, shuffling combined blocks with `rng`.
///
/// Fails without producing any block if a category or attribute side is empty.
pub fn generate_blocks<R: Rng + ?Sized>(
    config: &TestConfig,
    rng: &mut R,
) -> Result<Vec<Block>, IatError> {
    require_labels(config)?;

    let union = combined_items(config);
    let mut blocks = Vec::with_capacity(BLOCK_COUNT);

    for (kind, block_number) in BlockKind::CANONICAL_SEQUENCE.into_iter().zip(1u32..) {
        let stimuli = match kind {
            BlockKind::PracticeCategories(side) => number(
                items(&config.categories, LabelSource::Category, side).collect(),
                block_number,
                false,
            ),
            BlockKind::PracticeAttributes(side) => number(
                items(&config.attributes, LabelSource::Attribute, side).collect(),
                block_number,
                false,
            ),
            BlockKind::PracticeCombined(_) => {
                let mut set = union.clone();
                set.shuffle(rng);
                number(set, block_number, true)
            }
            BlockKind::TestCombined(_) => {
                let mut set = union.clone();
                set.extend(union.iter().cloned());
                set.shuffle(rng);
                number(set, block_number, true)
            }
        };

        let instructions = config
            .instructions
            .get(instruction_key(kind))
            .cloned()
            .unwrap_or_default();

        blocks.push(Block {
            block_number,
            kind,
            instructions,
            stimuli,
        });
    }

    tracing::debug!(
        test_id = %config.test_id,
        stimuli = blocks.iter().map(|b| b.stimuli.len()).sum::<usize>(),
        "generated block design"
    );
    Ok(blocks)
}

/// Total stimuli across all blocks.
pub fn total_trials(blocks: &[Block]) -> usize {
    blocks.iter().map(|b| b.stimuli.len()).sum()
}

/// Looks up the generated stimulus for a block/trial pair.
pub fn find_stimulus(blocks: &[Block], block_number: u32, trial_number: u32) -> Option<&Stimulus> {
    blocks
        .iter()
        .find(|b| b.block_number == block_number)?
        .stimuli
        .iter()
        .find(|s| s.trial_number == trial_number)
}

/// The stimulus presented after `(block_number, trial_number)`, crossing block
/// boundaries.
pub fn next_stimulus(
    blocks: &[Block],
    block_number: u32,
    trial_number: u32,
) -> Option<&Stimulus> {
    let mut sequence = blocks.iter().flat_map(|b| b.stimuli.iter());
    sequence.find(|s| s.block_number == block_number && s.trial_number == trial_number)?;
    sequence.next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{default_blocks_config, default_instructions, default_timing};
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;
    use std::collections::HashSet;

    fn labels(left: &[&str], right: &[&str]) -> SidedLabels {
        SidedLabels {
            left: left.iter().map(|s| s.to_string()).collect(),
            right: right.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn config() -> TestConfig {
        TestConfig {
            test_id: "flowers-insects".into(),
            name: "Flowers vs Insects".into(),
            description: String::new(),
            categories: labels(&["rose", "tulip"], &["ant", "wasp", "moth"]),
            attributes: labels(&["joy", "love"], &["pain", "hurt"]),
            instructions: default_instructions(),
            timing: default_timing(),
            blocks_config: default_blocks_config(),
        }
    }

    fn rng(seed: u64) -> Xoshiro256PlusPlus {
        Xoshiro256PlusPlus::seed_from_u64(seed)
    }

    #[test]
    fn produces_seven_blocks_in_fixed_order() {
        let blocks = generate_blocks(&config(), &mut rng(1)).unwrap();
        let numbers: Vec<u32> = blocks.iter().map(|b| b.block_number).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4, 5, 6, 7]);
        let kinds: Vec<&str> = blocks.iter().map(|b| b.kind.as_str()).collect();
        assert_eq!(
            kinds,
            vec![
                "practice_categories",
                "practice_attributes",
                "practice_combined",
                "test_combined",
                "practice_categories",
                "practice_combined",
                "test_combined",
            ]
        );
        let reverse: Vec<bool> = blocks.iter().map(|b| b.is_reverse()).collect();
        assert_eq!(reverse, vec![false, false, false, false, false, true, true]);
    }

    #[test]
    fn practice_blocks_follow_label_order() {
        let blocks = generate_blocks(&config(), &mut rng(1)).unwrap();
        let texts: Vec<&str> = blocks[0].stimuli.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["rose", "tulip"]);
        assert!(blocks[0]
            .stimuli
            .iter()
            .all(|s| s.correct_response() == Side::Left));

        assert!(blocks[1]
            .stimuli
            .iter()
            .all(|s| s.kind == StimulusKind::Attribute(Side::Right)));

        let fifth: Vec<&str> = blocks[4].stimuli.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(fifth, vec!["ant", "wasp", "moth"]);
        assert!(blocks[4]
            .stimuli
            .iter()
            .all(|s| s.correct_response() == Side::Right));
    }

    #[test]
    fn test_blocks_double_practice_blocks() {
        let blocks = generate_blocks(&config(), &mut rng(3)).unwrap();
        assert_eq!(blocks[2].stimuli.len(), 9);
        assert_eq!(blocks[3].stimuli.len(), 2 * blocks[2].stimuli.len());
        assert_eq!(blocks[6].stimuli.len(), 2 * blocks[5].stimuli.len());
    }

    #[test]
    fn trial_numbers_are_dense_and_unique() {
        let blocks = generate_blocks(&config(), &mut rng(5)).unwrap();
        for block in &blocks {
            let numbers: Vec<u32> = block.stimuli.iter().map(|s| s.trial_number).collect();
            let expected: Vec<u32> = (1..=block.stimuli.len() as u32).collect();
            assert_eq!(numbers, expected, "block {}", block.block_number);
            assert!(block
                .stimuli
                .iter()
                .all(|s| s.block_number == block.block_number));
        }
    }

    #[test]
    fn combined_stimuli_answer_with_owning_side() {
        let cfg = config();
        let blocks = generate_blocks(&cfg, &mut rng(9)).unwrap();
        for stim in &blocks[6].stimuli {
            let owner = match stim.source {
                LabelSource::Category => &cfg.categories,
                LabelSource::Attribute => &cfg.attributes,
            };
            assert!(owner.side(stim.correct_response()).contains(&stim.text));
        }
        let distinct: HashSet<&str> = blocks[6].stimuli.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(distinct.len(), 9);
    }

    #[test]
    fn same_seed_same_design() {
        let a = generate_blocks(&config(), &mut rng(11)).unwrap();
        let b = generate_blocks(&config(), &mut rng(11)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn empty_side_is_rejected() {
        let mut cfg = config();
        cfg.attributes.right.clear();
        let err = generate_blocks(&cfg, &mut rng(1)).unwrap_err();
        assert!(err.is_configuration_error());
        assert!(err.to_string().contains("attributes.right"));
    }

    #[test]
    fn next_stimulus_crosses_blocks() {
        let blocks = generate_blocks(&config(), &mut rng(2)).unwrap();
        let next = next_stimulus(&blocks, 1, 2).unwrap();
        assert_eq!((next.block_number, next.trial_number), (2, 1));
        let last = blocks[6].stimuli.len() as u32;
        assert!(next_stimulus(&blocks, 7, last).is_none());
        assert!(find_stimulus(&blocks, 7, last).is_some());
        assert_eq!(total_trials(&blocks), 2 + 2 + 9 + 18 + 3 + 9 + 18);
    }
}
