/// Per-unit activation record for one layer.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Neuron {
    /// Activation value after the layer's non-linearity (or the raw
    /// pre-activation while it is being accumulated).
    pub cell_output: f32,
    /// Error (gradient) arriving at this unit.
    pub er: f32,
    /// Dropout mask: a masked unit outputs 0 and passes no error back.
    pub mask: bool,
}

impl Neuron {
    pub fn layer(size: usize) -> Vec<Neuron> {
        vec![Neuron::default(); size]
    }
}
