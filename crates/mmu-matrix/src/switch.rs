//! Crosspoint switching
//!
//! Commands are parsed and resolved before the layer is touched, so a
//! rejected command never leaves a half-applied route behind.

use std::str::FromStr;

use tracing::info;

use crate::error::MatrixError;
use crate::layer::{props, Layer, LayerState, Route, StreamId, DISCONNECTED};
use crate::store::DeviceStore;
use crate::tree::{Actor, Change};
use crate::value::Value;

/// Source half of a crosspoint command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSpec {
    /// Input alias or stable identifier
    Stream(String),
    /// The disconnect sentinel
    Disconnect,
}

impl SourceSpec {
    pub fn parse(text: &str) -> Self {
        if text == DISCONNECTED {
            SourceSpec::Disconnect
        } else {
            SourceSpec::Stream(text.to_string())
        }
    }
}

/// A parsed `SRC:DST` command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrosspointCommand {
    pub source: SourceSpec,
    pub destination: String,
}

impl FromStr for CrosspointCommand {
    type Err = MatrixError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || MatrixError::MalformedCommand(s.to_string());
        let (source, destination) = s.split_once(':').ok_or_else(malformed)?;
        if source.is_empty() || destination.is_empty() || destination.contains(':') {
            return Err(malformed());
        }
        Ok(Self {
            source: SourceSpec::parse(source),
            destination: destination.to_string(),
        })
    }
}

fn resolve_source(state: &LayerState, source: &SourceSpec, gate: bool) -> Result<Route, MatrixError> {
    let name = match source {
        SourceSpec::Disconnect => return Ok(Route::Disconnected),
        SourceSpec::Stream(name) => name,
    };
    let id = state
        .find_input_by_alias(name)
        .cloned()
        .or_else(|| Some(StreamId::new(name.as_str())).filter(|id| state.is_input(id)))
        .ok_or_else(|| MatrixError::SourceNotFound {
            layer: state.layer(),
            stream: name.clone(),
        })?;
    check_gate(state, &id, gate)?;
    Ok(Route::Input(id))
}

fn resolve_destination(state: &LayerState, name: &str) -> Result<StreamId, MatrixError> {
    state
        .find_output_by_alias(name)
        .cloned()
        .or_else(|| Some(StreamId::new(name)).filter(|id| state.is_output(id)))
        .ok_or_else(|| MatrixError::DestinationNotFound {
            layer: state.layer(),
            stream: name.to_string(),
        })
}

fn check_gate(state: &LayerState, input: &StreamId, gate: bool) -> Result<(), MatrixError> {
    if gate && !state.is_enabled(input)? {
        return Err(MatrixError::SourceDisabled {
            layer: state.layer(),
            stream: input.to_string(),
        });
    }
    Ok(())
}

/// Point `output` at `route` and copy the source's signal onto it
///
/// Both names are assumed valid for the layer. All writes are internal, so
/// unchanged values produce no change events.
pub(crate) fn apply_route(
    state: &mut LayerState,
    output: &StreamId,
    route: &Route,
) -> Result<Vec<Change>, MatrixError> {
    let (alias, signal) = match route {
        Route::Disconnected => (String::new(), false),
        Route::Input(input) => (state.alias(input)?, state.signal_present(input)?),
    };

    let tree = state.tree_mut();
    let mut changes = tree.set(
        &output.property(props::SOURCE_STREAM),
        Value::string(route.source_stream()),
        Actor::Internal,
    )?;
    changes.extend(tree.set(
        &output.property(props::SOURCE_STREAM_ALIAS),
        Value::string(alias),
        Actor::Internal,
    )?);
    changes.extend(tree.set(
        &output.property(props::SIGNAL_PRESENT),
        Value::Bool(signal),
        Actor::Internal,
    )?);

    info!(
        "{} {} <- {} (signal={})",
        state.layer(),
        output,
        route.source_stream(),
        signal
    );
    Ok(changes)
}

impl DeviceStore {
    /// Execute a `SRC:DST` crosspoint command
    pub fn switch(&self, layer: Layer, command: &str) -> Result<(), MatrixError> {
        let command: CrosspointCommand = command.parse()?;
        let gate = self.config().enforce_enabled;

        self.mutate_layer(layer, |state| {
            let route = match &command.source {
                SourceSpec::Disconnect => Route::Disconnected,
                SourceSpec::Stream(_) => resolve_source(state, &command.source, false)?,
            };
            let output = resolve_destination(state, &command.destination)?;
            if let Route::Input(input) = &route {
                check_gate(state, input, gate)?;
            }
            let changes = apply_route(state, &output, &route)?;
            Ok(((), changes))
        })
    }

    /// Route every Output of a layer to one source, or disconnect them all
    pub fn switch_all(&self, layer: Layer, source: &str) -> Result<(), MatrixError> {
        let source = SourceSpec::parse(source);
        let gate = self.config().enforce_enabled;

        self.mutate_layer(layer, |state| {
            let route = resolve_source(state, &source, gate)?;
            let mut changes = Vec::new();
            for output in state.outputs().to_vec() {
                changes.extend(apply_route(state, &output, &route)?);
            }
            Ok(((), changes))
        })
    }

    /// Route an Output, by stable identifier, to an Input or disconnect it
    pub fn set_route(&self, layer: Layer, output: &StreamId, route: &Route) -> Result<(), MatrixError> {
        let gate = self.config().enforce_enabled;

        self.mutate_layer(layer, |state| {
            if let Route::Input(input) = route {
                if !state.is_input(input) {
                    return Err(MatrixError::SourceNotFound {
                        layer,
                        stream: input.to_string(),
                    });
                }
            }
            if !state.is_output(output) {
                return Err(MatrixError::DestinationNotFound {
                    layer,
                    stream: output.to_string(),
                });
            }
            if let Route::Input(input) = route {
                check_gate(state, input, gate)?;
            }
            let changes = apply_route(state, output, route)?;
            Ok(((), changes))
        })
    }
}
