//! Linear-interpolation resampler over interleaved f32 frames.

pub struct Resampler {
    ratio: f32,
    index: f32,
    last_samples: Vec<f32>,
    channels: usize,
}

impl Resampler {
    pub fn new(source_rate: u32, target_rate: u32, channels: usize) -> Self {
        Self {
            ratio: source_rate as f32 / target_rate as f32,
            index: 0.0,
            last_samples: vec![0.0; channels],
            channels,
        }
    }

    /// Resample `input` and append the produced frames to `output`.
    pub fn process(&mut self, input: &[f32], output: &mut Vec<f32>) {
        let num_frames = input.len() / self.channels;
        if num_frames == 0 {
            return;
        }

        while self.index < num_frames as f32 {
            let idx = self.index as usize;
            let fract = self.index.fract();

            for c in 0..self.channels {
                let s1 = if idx == 0 {
                    self.last_samples[c]
                } else {
                    input[(idx - 1) * self.channels + c]
                };
                let s2 = if idx < num_frames {
                    input[idx * self.channels + c]
                } else {
                    input[(num_frames - 1) * self.channels + c]
                };
                output.push(s1 * (1.0 - fract) + s2 * fract);
            }

            self.index += self.ratio;
        }

        self.index -= num_frames as f32;
        for c in 0..self.channels {
            self.last_samples[c] = input[(num_frames - 1) * self.channels + c];
        }
    }
}

/// Re-lay interleaved frames from `src_channels` to `dst_channels`:
/// mono duplicates, downmix averages, anything else truncates or repeats
/// the last channel.
pub fn remap_channels(input: &[f32], src_channels: usize, dst_channels: usize) -> Vec<f32> {
    if src_channels == dst_channels || src_channels == 0 {
        return input.to_vec();
    }

    let frames = input.len() / src_channels;
    let mut output = Vec::with_capacity(frames * dst_channels);

    for frame in 0..frames {
        let start = frame * src_channels;
        if dst_channels == 1 {
            let sum: f32 = input[start..start + src_channels].iter().sum();
            output.push(sum / src_channels as f32);
        } else if src_channels == 1 {
            for _ in 0..dst_channels {
                output.push(input[start]);
            }
        } else {
            for c in 0..dst_channels {
                output.push(input[start + c.min(src_channels - 1)]);
            }
        }
    }
    output
}
