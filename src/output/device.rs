//! Renders a [`SoftwareGraph`] to a hardware output device via cpal.

use super::SoftwareGraph;
use crate::error::{SessionError, SessionResult};
use cpal::{
    BufferSize, SampleRate, Stream, StreamConfig,
    traits::{DeviceTrait, HostTrait, StreamTrait},
};
use std::sync::Arc;
use tracing::{info, warn};

/// An open output stream pulling blocks from a graph.
///
/// The stream stops when this value is dropped.
pub struct DeviceOutput {
    graph: Arc<SoftwareGraph>,
    _stream: Stream,
}

impl DeviceOutput {
    /// Open the default output device at the graph's rate and channel count
    /// and start rendering.
    pub fn open_default(graph: Arc<SoftwareGraph>) -> SessionResult<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| SessionError::backend("cpal", "No output device available"))?;

        let channels = u16::try_from(graph.channels()).map_err(|_| {
            SessionError::InvalidConfig(format!("{} channels not supported", graph.channels()))
        })?;
        let config = StreamConfig {
            channels,
            sample_rate: SampleRate(graph.sample_rate()),
            buffer_size: BufferSize::Default,
        };

        let render_graph = Arc::clone(&graph);
        let stream = device.build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                render_graph.render(data);
            },
            |err| {
                warn!(%err, "audio output stream error");
            },
            None,
        )?;
        stream.play()?;

        info!(
            device = device.name().unwrap_or_default(),
            sample_rate = graph.sample_rate(),
            channels,
            "audio output opened"
        );

        Ok(Self {
            graph,
            _stream: stream,
        })
    }

    /// Graph rendered by this device
    pub fn graph(&self) -> &Arc<SoftwareGraph> {
        &self.graph
    }
}
