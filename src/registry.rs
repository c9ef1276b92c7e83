//! Descriptor registry: the fixed routing topology of the module.
//!
//! Every named node of the crossbar, including the pseudo-sources that have
//! no upstream of their own (`floating`, `logic_high`, `logic_low`, `ClkIn`),
//! lives in one arena addressed by [`TerminalId`]. Input options refer to
//! their upstream by id, so mutually cyclic edges (every PXI trigger line can
//! be driven by every other one) need no special construction order.
//!
//! The registry is built once on first use and never changes.

use std::collections::HashMap;
use std::fmt;

use once_cell::sync::Lazy;

use crate::regs::{self, dstara, line_state, trig};

/// Stable index of a descriptor in the registry arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TerminalId(u16);

impl TerminalId {
    /// Position of this descriptor in the arena.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Number of PXI trigger lines.
pub const PXI_TRIG_COUNT: u32 = 8;
/// Number of single-ended PFI lines.
pub const PFI_COUNT: u32 = 6;
/// Number of PXI star lines.
pub const PXI_STAR_COUNT: u32 = 17;
/// Number of clock banks.
pub const BANK_COUNT: u32 = 4;
/// Number of PXIe DStarA outputs.
pub const PXIE_DSTARA_COUNT: u32 = 17;

/// Family a descriptor belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// Pseudo-sources and hard inputs that are never instantiated.
    Source,
    /// PXI trigger bus lines.
    PxiTrig,
    /// Programmable function interface lines.
    Pfi,
    /// PXI star trigger lines.
    PxiStar,
    /// SourceA / SourceB clock muxes.
    ClockSource,
    /// SourceA / SourceB divider selectors.
    DividerSelect,
    /// DStarA bank selectors.
    Bank,
    /// PXIe DStarA outputs (hard-wired to a bank).
    PxieDStarA,
}

impl Category {
    /// Bring-up order. Later categories may route from earlier ones.
    pub const INSTANTIATION_ORDER: [Category; 7] = [
        Category::PxiTrig,
        Category::Pfi,
        Category::PxiStar,
        Category::ClockSource,
        Category::DividerSelect,
        Category::Bank,
        Category::PxieDStarA,
    ];
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source => write!(f, "source"),
            Self::PxiTrig => write!(f, "PXI trigger"),
            Self::Pfi => write!(f, "PFI"),
            Self::PxiStar => write!(f, "PXI star"),
            Self::ClockSource => write!(f, "clock source"),
            Self::DividerSelect => write!(f, "divider select"),
            Self::Bank => write!(f, "bank"),
            Self::PxieDStarA => write!(f, "PXIe DStarA"),
        }
    }
}

/// A control word whose bit-fields belong to several terminals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SharedRegister {
    /// SourceA/SourceB muxes and the four bank selectors.
    DStarACtrl1,
    /// SourceA/SourceB divider selects.
    DStarACtrl2,
}

impl SharedRegister {
    /// Byte offset in the sync block.
    pub fn offset(self) -> usize {
        match self {
            Self::DStarACtrl1 => regs::DSTARA_CTRL1,
            Self::DStarACtrl2 => regs::DSTARA_CTRL2,
        }
    }
}

/// How selecting an input reaches the hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commit {
    /// Full-word write of the trigger control register.
    TriggerControl {
        /// DEST code identifying this terminal.
        destination: u32,
    },
    /// Read-modify-write of the field this terminal owns in a shared word.
    SharedField {
        register: SharedRegister,
        /// Bits of `register` owned by this terminal.
        field_mask: u32,
    },
    /// Nothing to program; the selection is recorded only.
    BookkeepingOnly,
}

/// One legal source of a terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputOption {
    /// Upstream descriptor.
    pub source: TerminalId,
    /// Value written into the destination field when selected.
    pub data: u32,
}

/// Immutable definition of a terminal.
#[derive(Debug, Clone)]
pub struct TerminalDescriptor {
    name: String,
    category: Category,
    index: u32,
    inputs: Vec<InputOption>,
    commit: Commit,
    line_state_bit: Option<u32>,
}

impl TerminalDescriptor {
    /// Terminal name as exposed to users, e.g. `PXI_Trig3`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Family this terminal belongs to.
    pub fn category(&self) -> Category {
        self.category
    }

    /// Index within its category.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Legal inputs in declared order.
    pub fn inputs(&self) -> &[InputOption] {
        &self.inputs
    }

    /// The input a terminal starts on. `None` only for pseudo-sources.
    pub fn default_input(&self) -> Option<&InputOption> {
        self.inputs.first()
    }

    /// How input changes are committed.
    pub fn commit(&self) -> Commit {
        self.commit
    }

    /// Bit position of the live line state, if any.
    pub fn line_state_bit(&self) -> Option<u32> {
        self.line_state_bit
    }

    /// Polarity only exists on terminals owning a trigger control word.
    pub fn supports_polarity(&self) -> bool {
        matches!(self.commit, Commit::TriggerControl { .. })
    }

    fn source(name: &str) -> Self {
        Self {
            name: name.to_string(),
            category: Category::Source,
            index: 0,
            inputs: Vec::new(),
            commit: Commit::BookkeepingOnly,
            line_state_bit: None,
        }
    }
}

/// Lazy, restartable walk over a terminal's inputs in declared order.
#[derive(Clone)]
pub struct InputIter<'a> {
    registry: &'a DescriptorRegistry,
    inner: std::slice::Iter<'a, InputOption>,
}

impl<'a> Iterator for InputIter<'a> {
    type Item = (&'a str, &'a InputOption);

    fn next(&mut self) -> Option<Self::Item> {
        let option = self.inner.next()?;
        Some((self.registry.name(option.source), option))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for InputIter<'_> {}

/// The complete, immutable routing topology.
pub struct DescriptorRegistry {
    descriptors: Vec<TerminalDescriptor>,
    by_name: HashMap<String, TerminalId>,
}

static REGISTRY: Lazy<DescriptorRegistry> = Lazy::new(DescriptorRegistry::build);

// Arena layout. Bases are fixed so inputs can name any terminal up front.
const FLOATING: TerminalId = TerminalId(0);
const LOGIC_HIGH: TerminalId = TerminalId(1);
const LOGIC_LOW: TerminalId = TerminalId(2);
const CLKIN: TerminalId = TerminalId(3);
const PXI_TRIG_BASE: u16 = 4;
const PFI_BASE: u16 = PXI_TRIG_BASE + PXI_TRIG_COUNT as u16;
const PXI_STAR_BASE: u16 = PFI_BASE + PFI_COUNT as u16;
const SOURCE_A: TerminalId = TerminalId(PXI_STAR_BASE + PXI_STAR_COUNT as u16);
const SOURCE_B: TerminalId = TerminalId(SOURCE_A.0 + 1);
const SOURCE_A_DIV: TerminalId = TerminalId(SOURCE_A.0 + 2);
const SOURCE_B_DIV: TerminalId = TerminalId(SOURCE_A.0 + 3);
const BANK_BASE: u16 = SOURCE_A.0 + 4;
const DSTARA_BASE: u16 = BANK_BASE + BANK_COUNT as u16;
const DESCRIPTOR_COUNT: usize = DSTARA_BASE as usize + PXIE_DSTARA_COUNT as usize;

const fn pxi_trig(n: u32) -> TerminalId {
    TerminalId(PXI_TRIG_BASE + n as u16)
}

const fn pfi(n: u32) -> TerminalId {
    TerminalId(PFI_BASE + n as u16)
}

const fn pxi_star(n: u32) -> TerminalId {
    TerminalId(PXI_STAR_BASE + n as u16)
}

const fn bank(n: u32) -> TerminalId {
    TerminalId(BANK_BASE + n as u16)
}

const fn pxie_dstara(n: u32) -> TerminalId {
    TerminalId(DSTARA_BASE + n as u16)
}

/// The three pseudo-sources every trigger-control terminal starts with.
fn static_levels() -> Vec<InputOption> {
    vec![
        InputOption {
            source: FLOATING,
            data: trig::SRC_FLOATING,
        },
        InputOption {
            source: LOGIC_HIGH,
            data: trig::SRC_LOGIC_HIGH,
        },
        InputOption {
            source: LOGIC_LOW,
            data: trig::SRC_LOGIC_LOW,
        },
    ]
}

fn pfi_inputs(except: Option<u32>) -> impl Iterator<Item = InputOption> {
    (0..PFI_COUNT)
        .filter(move |&k| Some(k) != except)
        .map(|k| InputOption {
            source: pfi(k),
            data: trig::src_pfi_se(k),
        })
}

fn pxi_trig_inputs(except: Option<u32>) -> impl Iterator<Item = InputOption> {
    (0..PXI_TRIG_COUNT)
        .filter(move |&k| Some(k) != except)
        .map(|k| InputOption {
            source: pxi_trig(k),
            data: trig::src_pxi_trig(k),
        })
}

fn pxi_star_inputs() -> impl Iterator<Item = InputOption> {
    (0..PXI_STAR_COUNT).map(|k| InputOption {
        source: pxi_star(k),
        data: trig::src_pxi_star(k),
    })
}

impl DescriptorRegistry {
    /// The process-wide registry.
    pub fn get() -> &'static DescriptorRegistry {
        &REGISTRY
    }

    fn build() -> Self {
        let mut descriptors = Vec::with_capacity(DESCRIPTOR_COUNT);

        descriptors.push(TerminalDescriptor::source("floating"));
        descriptors.push(TerminalDescriptor::source("logic_high"));
        descriptors.push(TerminalDescriptor::source("logic_low"));
        descriptors.push(TerminalDescriptor::source("ClkIn"));

        for n in 0..PXI_TRIG_COUNT {
            let mut inputs = static_levels();
            inputs.extend(pfi_inputs(None));
            inputs.extend(pxi_trig_inputs(Some(n)));
            descriptors.push(TerminalDescriptor {
                name: format!("PXI_Trig{n}"),
                category: Category::PxiTrig,
                index: n,
                inputs,
                commit: Commit::TriggerControl {
                    destination: trig::dest_pxi_trig(n),
                },
                line_state_bit: Some(line_state::pxi_trig(n)),
            });
        }

        for n in 0..PFI_COUNT {
            let mut inputs = static_levels();
            inputs.extend(pfi_inputs(Some(n)));
            inputs.extend(pxi_trig_inputs(None));
            inputs.extend(pxi_star_inputs());
            descriptors.push(TerminalDescriptor {
                name: format!("PFI{n}"),
                category: Category::Pfi,
                index: n,
                inputs,
                commit: Commit::TriggerControl {
                    destination: trig::dest_pfi_se(n),
                },
                line_state_bit: Some(line_state::pfi(n)),
            });
        }

        for n in 0..PXI_STAR_COUNT {
            let mut inputs = static_levels();
            inputs.extend(pfi_inputs(None));
            descriptors.push(TerminalDescriptor {
                name: format!("PXI_Star{n}"),
                category: Category::PxiStar,
                index: n,
                inputs,
                commit: Commit::TriggerControl {
                    destination: trig::dest_pxi_star(n),
                },
                line_state_bit: Some(line_state::pxi_star(n)),
            });
        }

        descriptors.push(TerminalDescriptor {
            name: "SourceA".to_string(),
            category: Category::ClockSource,
            index: 0,
            inputs: vec![InputOption {
                source: CLKIN,
                data: dstara::srca_mux2(dstara::SRC_CLKIN),
            }],
            commit: Commit::SharedField {
                register: SharedRegister::DStarACtrl1,
                field_mask: dstara::SRCA_MUX2_MASK,
            },
            line_state_bit: None,
        });
        descriptors.push(TerminalDescriptor {
            name: "SourceB".to_string(),
            category: Category::ClockSource,
            index: 1,
            inputs: vec![InputOption {
                source: CLKIN,
                data: dstara::srcb_mux2(dstara::SRC_CLKIN),
            }],
            commit: Commit::SharedField {
                register: SharedRegister::DStarACtrl1,
                field_mask: dstara::SRCB_MUX2_MASK,
            },
            line_state_bit: None,
        });
        descriptors.push(TerminalDescriptor {
            name: "SourceADividerSelect".to_string(),
            category: Category::DividerSelect,
            index: 0,
            inputs: vec![InputOption {
                source: SOURCE_A,
                data: dstara::srca_use_divider(0),
            }],
            commit: Commit::SharedField {
                register: SharedRegister::DStarACtrl2,
                field_mask: dstara::srca_use_divider(1),
            },
            line_state_bit: None,
        });
        descriptors.push(TerminalDescriptor {
            name: "SourceBDividerSelect".to_string(),
            category: Category::DividerSelect,
            index: 1,
            inputs: vec![InputOption {
                source: SOURCE_B,
                data: dstara::srcb_use_divider(0),
            }],
            commit: Commit::SharedField {
                register: SharedRegister::DStarACtrl2,
                field_mask: dstara::srcb_use_divider(1),
            },
            line_state_bit: None,
        });

        for n in 0..BANK_COUNT {
            descriptors.push(TerminalDescriptor {
                name: format!("Bank{n}"),
                category: Category::Bank,
                index: n,
                inputs: vec![
                    InputOption {
                        source: FLOATING,
                        data: dstara::bank(n, dstara::SRC_FLOATING),
                    },
                    InputOption {
                        source: SOURCE_A_DIV,
                        data: dstara::bank(n, dstara::SRC_SRCA),
                    },
                    InputOption {
                        source: SOURCE_B_DIV,
                        data: dstara::bank(n, dstara::SRC_SRCB),
                    },
                ],
                commit: Commit::SharedField {
                    register: SharedRegister::DStarACtrl1,
                    field_mask: dstara::bank_mask(n),
                },
                line_state_bit: None,
            });
        }

        // Four outputs per bank; the seventeenth shares bank 3.
        for n in 0..PXIE_DSTARA_COUNT {
            descriptors.push(TerminalDescriptor {
                name: format!("PXIe_DStarA{n}"),
                category: Category::PxieDStarA,
                index: n,
                inputs: vec![InputOption {
                    source: bank((n / 4).min(BANK_COUNT - 1)),
                    data: 0,
                }],
                commit: Commit::BookkeepingOnly,
                line_state_bit: None,
            });
        }

        debug_assert_eq!(descriptors.len(), DESCRIPTOR_COUNT);

        let by_name = descriptors
            .iter()
            .enumerate()
            .map(|(i, d)| (d.name.clone(), TerminalId(i as u16)))
            .collect();

        Self {
            descriptors,
            by_name,
        }
    }

    /// Descriptor for `id`.
    pub fn descriptor(&self, id: TerminalId) -> &TerminalDescriptor {
        &self.descriptors[id.index()]
    }

    /// Name of the descriptor `id`.
    pub fn name(&self, id: TerminalId) -> &str {
        &self.descriptors[id.index()].name
    }

    /// Look a descriptor up by its exact name.
    pub fn lookup(&self, name: &str) -> Option<TerminalId> {
        self.by_name.get(name).copied()
    }

    /// Look a descriptor up by category and index.
    pub fn by_category(&self, category: Category, index: u32) -> Option<TerminalId> {
        self.descriptors
            .iter()
            .position(|d| d.category == category && d.index == index)
            .map(|i| TerminalId(i as u16))
    }

    /// The pseudo-source meaning "no driven input".
    pub fn floating(&self) -> TerminalId {
        FLOATING
    }

    /// Walk the inputs of `id` in declared order.
    pub fn inputs(&self, id: TerminalId) -> InputIter<'_> {
        InputIter {
            registry: self,
            inner: self.descriptor(id).inputs.iter(),
        }
    }

    /// Find the input of `id` whose upstream is named exactly `name`.
    pub fn find_input(&self, id: TerminalId, name: &str) -> Option<&InputOption> {
        self.inputs(id)
            .find(|(input_name, _)| *input_name == name)
            .map(|(_, option)| option)
    }

    /// Terminals that get a runtime instance, in bring-up order.
    pub fn instantiation_order(&self) -> impl Iterator<Item = TerminalId> + '_ {
        Category::INSTANTIATION_ORDER.into_iter().flat_map(move |category| {
            self.descriptors
                .iter()
                .enumerate()
                .filter(move |(_, d)| d.category == category)
                .map(|(i, _)| TerminalId(i as u16))
        })
    }

    /// Number of terminals that get a runtime instance.
    pub fn terminal_count(&self) -> usize {
        self.descriptors
            .iter()
            .filter(|d| d.category != Category::Source)
            .count()
    }

    /// All descriptors, pseudo-sources included, in arena order.
    pub fn descriptors(&self) -> impl Iterator<Item = (TerminalId, &TerminalDescriptor)> {
        self.descriptors
            .iter()
            .enumerate()
            .map(|(i, d)| (TerminalId(i as u16), d))
    }
}

impl fmt::Debug for DescriptorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DescriptorRegistry")
            .field("descriptors", &self.descriptors.len())
            .finish()
    }
}
