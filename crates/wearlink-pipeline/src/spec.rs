use wearlink_telemetry::{Env, Sample, SampleHandler};
use wearlink_wire::{AccountMode, MapFunction, OpKind};

use crate::sources::DataSource;

/// Comparison operator of a compare stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl ComparisonOp {
    pub fn value(self) -> u8 {
        match self {
            ComparisonOp::Eq => 0x00,
            ComparisonOp::Neq => 0x01,
            ComparisonOp::Lt => 0x02,
            ComparisonOp::Lte => 0x03,
            ComparisonOp::Gt => 0x04,
            ComparisonOp::Gte => 0x05,
        }
    }
}

/// Host-side callback fired when the board signals a route's event.
pub type Reaction = Box<dyn FnMut() + Send>;

#[derive(Debug, Clone)]
pub(crate) enum Stage {
    Map {
        function: MapFunction,
        operand: Option<i32>,
    },
    Accumulate,
    Delta {
        magnitude: u32,
    },
    Threshold {
        boundary: i32,
    },
    Lowpass {
        samples: u8,
    },
    Highpass {
        samples: u8,
    },
    Delay {
        samples: u8,
    },
    Limit {
        period_ms: u16,
    },
    Compare {
        op: ComparisonOp,
        reference: i32,
    },
    Passthrough,
    Split,
    Index(u8),
    Multicast,
    To,
    EndMulticast,
    Fuse(Vec<String>),
    Pack(u8),
    Account(AccountMode),
    Buffer,
    Name(String),
    Stream(usize),
    Log,
    React(usize),
}

impl Stage {
    /// Processor-node encoding for linear stages: kind, parameter bytes,
    /// and the identifier segment name. `None` for structural stages.
    pub(crate) fn processor(&self) -> Option<(OpKind, Vec<u8>, &'static str)> {
        Some(match self {
            Stage::Map { function, operand } => {
                let mut params = vec![function.value()];
                if let Some(rhs) = operand {
                    params.extend_from_slice(&rhs.to_le_bytes());
                }
                (OpKind::Map, params, function.name())
            }
            Stage::Accumulate => (OpKind::Accumulate, Vec::new(), "accumulate"),
            Stage::Delta { magnitude } => {
                (OpKind::Delta, magnitude.to_le_bytes().to_vec(), "delta")
            }
            Stage::Threshold { boundary } => {
                (OpKind::Threshold, boundary.to_le_bytes().to_vec(), "threshold")
            }
            Stage::Lowpass { samples } => (OpKind::Lowpass, vec![*samples], "lowpass"),
            Stage::Highpass { samples } => (OpKind::Highpass, vec![*samples], "highpass"),
            Stage::Delay { samples } => (OpKind::Delay, vec![*samples], "delay"),
            Stage::Limit { period_ms } => {
                (OpKind::Limit, period_ms.to_le_bytes().to_vec(), "limit")
            }
            Stage::Compare { op, reference } => {
                let mut params = vec![op.value()];
                params.extend_from_slice(&reference.to_le_bytes());
                (OpKind::Comparison, params, "comparison")
            }
            Stage::Passthrough => (OpKind::Passthrough, Vec::new(), "passthrough"),
            Stage::Pack(count) => (OpKind::Pack, vec![*count], "pack"),
            Stage::Account(mode) => (OpKind::Account, vec![mode.value()], mode.name()),
            Stage::Buffer => (OpKind::Buffer, Vec::new(), "buffer"),
            _ => return None,
        })
    }

    /// Component count after this stage, given the upstream count.
    pub(crate) fn output_components(&self, components: u8) -> u8 {
        match self {
            Stage::Map { function, .. } => match function {
                MapFunction::Rms | MapFunction::Rss => 1,
                _ => components,
            },
            _ => components,
        }
    }
}

/// Fluent description of one data pipeline, compiled by
/// [`RouteGraph::build_route`](crate::RouteGraph::build_route).
///
/// Stages are recorded in call order; nothing touches the board until
/// compilation.
pub struct RouteSpec {
    pub(crate) source: DataSource,
    pub(crate) stages: Vec<Stage>,
    pub(crate) handlers: Vec<Option<SampleHandler>>,
    pub(crate) reactions: Vec<Option<Reaction>>,
}

impl RouteSpec {
    pub fn new(source: DataSource) -> Self {
        Self {
            source,
            stages: Vec::new(),
            handlers: Vec::new(),
            reactions: Vec::new(),
        }
    }

    fn push(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    /// Apply a unary map function (abs, rms, rss, sqrt).
    pub fn map(self, function: MapFunction) -> Self {
        self.push(Stage::Map {
            function,
            operand: None,
        })
    }

    /// Apply a binary map function with a constant right-hand side.
    pub fn map_with(self, function: MapFunction, operand: i32) -> Self {
        self.push(Stage::Map {
            function,
            operand: Some(operand),
        })
    }

    /// Running sum of inputs.
    pub fn accumulate(self) -> Self {
        self.push(Stage::Accumulate)
    }

    /// Pass values only when they differ from the last output by at
    /// least `magnitude`.
    pub fn delta(self, magnitude: u32) -> Self {
        self.push(Stage::Delta { magnitude })
    }

    /// Pass values crossing `boundary`.
    pub fn threshold(self, boundary: i32) -> Self {
        self.push(Stage::Threshold { boundary })
    }

    pub fn lowpass(self, samples: u8) -> Self {
        self.push(Stage::Lowpass { samples })
    }

    pub fn highpass(self, samples: u8) -> Self {
        self.push(Stage::Highpass { samples })
    }

    /// Delay the stream by `samples` samples.
    pub fn delay(self, samples: u8) -> Self {
        self.push(Stage::Delay { samples })
    }

    /// Rate-limit to at most one sample per `period_ms`.
    pub fn limit(self, period_ms: u16) -> Self {
        self.push(Stage::Limit { period_ms })
    }

    /// Pass values satisfying `op` against `reference`.
    pub fn compare(self, op: ComparisonOp, reference: i32) -> Self {
        self.push(Stage::Compare { op, reference })
    }

    pub fn passthrough(self) -> Self {
        self.push(Stage::Passthrough)
    }

    /// Demultiplex a multi-component upstream; follow with
    /// [`index`](Self::index) to select one component.
    pub fn split(self) -> Self {
        self.push(Stage::Split)
    }

    /// Select component `n` of the split upstream.
    pub fn index(self, n: u8) -> Self {
        self.push(Stage::Index(n))
    }

    /// Fan the current upstream out to independent branches. Each branch
    /// starts with [`to`](Self::to); close with
    /// [`end_multicast`](Self::end_multicast).
    pub fn multicast(self) -> Self {
        self.push(Stage::Multicast)
    }

    pub fn to(self) -> Self {
        self.push(Stage::To)
    }

    pub fn end_multicast(self) -> Self {
        self.push(Stage::EndMulticast)
    }

    /// Merge the current upstream with already-named nodes into one
    /// combined record.
    pub fn fuse(self, names: &[&str]) -> Self {
        self.push(Stage::Fuse(names.iter().map(|s| s.to_string()).collect()))
    }

    /// Buffer up to `count` raw samples per notification frame.
    pub fn pack(self, count: u8) -> Self {
        self.push(Stage::Pack(count))
    }

    /// Prefix each sample with a count or device-tick header.
    pub fn account(self, mode: AccountMode) -> Self {
        self.push(Stage::Account(mode))
    }

    /// Readable on-device state; no notifications.
    pub fn buffer(self) -> Self {
        self.push(Stage::Buffer)
    }

    /// Name the most recently created node for later lookup (fuse,
    /// parameter edits). Names are unique across the whole graph.
    pub fn name(self, name: &str) -> Self {
        self.push(Stage::Name(name.to_string()))
    }

    /// Stream the current upstream to a host callback.
    pub fn stream(mut self, handler: impl FnMut(&Sample, &mut Env) + Send + 'static) -> Self {
        let idx = self.handlers.len();
        self.handlers.push(Some(Box::new(handler)));
        self.push(Stage::Stream(idx))
    }

    /// Persist the current upstream to the on-device log.
    pub fn log(self) -> Self {
        self.push(Stage::Log)
    }

    /// Fire a host callback when the board signals this point of the
    /// chain. The callback may issue further commands (parameter edits),
    /// which is how on-device feedback loops are expressed.
    pub fn react(mut self, reaction: impl FnMut() + Send + 'static) -> Self {
        let idx = self.reactions.len();
        self.reactions.push(Some(Box::new(reaction)));
        self.push(Stage::React(idx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_record_in_call_order() {
        let spec = RouteSpec::new(DataSource::acceleration())
            .map(MapFunction::Rms)
            .accumulate()
            .name("sum")
            .log();
        assert_eq!(spec.stages.len(), 4);
        assert!(matches!(spec.stages[0], Stage::Map { .. }));
        assert!(matches!(spec.stages[3], Stage::Log));
    }

    #[test]
    fn map_params_carry_function_and_operand() {
        let (kind, params, name) = Stage::Map {
            function: MapFunction::Multiply,
            operand: Some(3),
        }
        .processor()
        .unwrap();
        assert_eq!(kind, OpKind::Map);
        assert_eq!(params, vec![MapFunction::Multiply.value(), 3, 0, 0, 0]);
        assert_eq!(name, "multiply");
    }

    #[test]
    fn rms_collapses_components() {
        let stage = Stage::Map {
            function: MapFunction::Rms,
            operand: None,
        };
        assert_eq!(stage.output_components(3), 1);
        assert_eq!(Stage::Accumulate.output_components(3), 3);
    }
}
