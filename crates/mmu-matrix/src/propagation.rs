//! Signal propagation from Inputs to the Outputs they feed

use std::sync::Arc;

use tracing::debug;

use crate::error::MatrixError;
use crate::layer::{props, Layer, StreamId};
use crate::tree::{PropertyTree, Write};
use crate::value::Value;

/// Outputs of `outputs` whose `SourceStream` currently names `input`
pub fn affected_outputs<'a>(
    tree: &PropertyTree,
    input: &StreamId,
    outputs: &'a [StreamId],
) -> Vec<&'a StreamId> {
    outputs
        .iter()
        .filter(|output| {
            tree.get(&output.property(props::SOURCE_STREAM))
                .ok()
                .and_then(Value::as_str)
                == Some(input.as_str())
        })
        .collect()
}

/// Attach a `SignalPresent` subscriber to every Input
///
/// When an Input's signal changes, every Output currently routed from it
/// receives the same value. Outputs routed elsewhere are untouched.
pub fn wire(
    layer: Layer,
    tree: &mut PropertyTree,
    inputs: &[StreamId],
    outputs: Arc<[StreamId]>,
) -> Result<(), MatrixError> {
    for input in inputs {
        let source = input.clone();
        let outputs = Arc::clone(&outputs);
        tree.subscribe(
            &input.property(props::SIGNAL_PRESENT),
            Box::new(move |change, tree| {
                let targets = affected_outputs(tree, &source, &outputs);
                if !targets.is_empty() {
                    debug!(
                        "{} {} signal={} -> {} output(s)",
                        layer,
                        source,
                        change.value,
                        targets.len()
                    );
                }
                targets
                    .into_iter()
                    .map(|output| Write {
                        path: output.property(props::SIGNAL_PRESENT),
                        value: change.value.clone(),
                    })
                    .collect()
            }),
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::Actor;

    fn tree_with(routes: &[(&str, &str)]) -> (PropertyTree, Vec<StreamId>, Arc<[StreamId]>) {
        let inputs = vec![StreamId::new("A_S0"), StreamId::new("B_S0")];
        let outputs: Arc<[StreamId]> = routes
            .iter()
            .map(|(out, _)| StreamId::new(*out))
            .collect::<Vec<_>>()
            .into();

        let mut tree = PropertyTree::new();
        for input in &inputs {
            tree.add_property(&input.property(props::SIGNAL_PRESENT), Value::Bool(true), true);
        }
        for (out, src) in routes {
            let id = StreamId::new(*out);
            tree.add_property(&id.property(props::SOURCE_STREAM), Value::string(*src), false);
            tree.add_property(&id.property(props::SIGNAL_PRESENT), Value::Bool(true), false);
        }
        wire(Layer::Video, &mut tree, &inputs, Arc::clone(&outputs)).unwrap();
        (tree, inputs, outputs)
    }

    #[test]
    fn test_only_routed_outputs_follow() {
        let (mut tree, inputs, _) =
            tree_with(&[("X_D0", "A_S0"), ("Y_D0", "B_S0"), ("Z_D0", "A_S0")]);

        let changes = tree
            .set(
                &inputs[0].property(props::SIGNAL_PRESENT),
                Value::Bool(false),
                Actor::External,
            )
            .unwrap();
        assert_eq!(changes.len(), 3);

        let signal = |id: &str| {
            tree.get(&StreamId::new(id).property(props::SIGNAL_PRESENT))
                .unwrap()
                .as_bool()
                .unwrap()
        };
        assert!(!signal("X_D0"));
        assert!(signal("Y_D0"));
        assert!(!signal("Z_D0"));
    }

    #[test]
    fn test_disconnected_outputs_are_untouched() {
        let (mut tree, inputs, outputs) = tree_with(&[("X_D0", "0")]);
        assert!(affected_outputs(&tree, &inputs[0], &outputs).is_empty());

        let changes = tree
            .set(
                &inputs[0].property(props::SIGNAL_PRESENT),
                Value::Bool(false),
                Actor::External,
            )
            .unwrap();
        assert_eq!(changes.len(), 1);
    }
}
