use cassetteflow_core::{Direction, FskReceiver, FskTransmitter, LineAssembler, ModemConfig};
use wasm_bindgen::prelude::*;

fn js_err(e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&e.to_string())
}

fn modem(mode: Option<String>, sample_rate: Option<u32>) -> ModemConfig {
    let mut config = ModemConfig::default();
    if let Some(mode) = mode {
        config.mode = mode;
    }
    if let Some(rate) = sample_rate {
        config.sample_rate = rate;
    }
    config
}

#[wasm_bindgen]
pub struct WasmTransmitter {
    inner: FskTransmitter,
}

#[wasm_bindgen]
impl WasmTransmitter {
    /// Bell 202 at 48 kHz unless a mode or sample rate is given
    #[wasm_bindgen(constructor)]
    pub fn new(mode: Option<String>, sample_rate: Option<u32>) -> Result<WasmTransmitter, JsValue> {
        let profile = modem(mode, sample_rate)
            .profile(Direction::Transmit)
            .map_err(js_err)?;
        FskTransmitter::new(profile)
            .map(|inner| WasmTransmitter { inner })
            .map_err(js_err)
    }

    /// Modulate one record line; returns interleaved stereo Int16Array samples
    #[wasm_bindgen(js_name = encodeLine)]
    pub fn encode_line(&mut self, line: &str) -> Result<Vec<i16>, JsValue> {
        let mut pcm = Vec::new();
        self.inner.transmit_line(line, &mut pcm).map_err(js_err)?;
        Ok(pcm)
    }

    /// Trailer tone closing the current burst
    #[wasm_bindgen(js_name = endBurst)]
    pub fn end_burst(&mut self) -> Result<Vec<i16>, JsValue> {
        let mut pcm = Vec::new();
        self.inner.end_burst(&mut pcm).map_err(js_err)?;
        Ok(pcm)
    }
}

#[wasm_bindgen]
pub struct WasmReceiver {
    inner: FskReceiver,
    lines: LineAssembler,
}

#[wasm_bindgen]
impl WasmReceiver {
    #[wasm_bindgen(constructor)]
    pub fn new(mode: Option<String>, sample_rate: Option<u32>) -> Result<WasmReceiver, JsValue> {
        let plan = modem(mode, sample_rate).receive_plan().map_err(js_err)?;
        FskReceiver::new(plan)
            .map(|inner| WasmReceiver {
                inner,
                lines: LineAssembler::new(),
            })
            .map_err(js_err)
    }

    /// Feed interleaved stereo samples; returns completed lines joined by '\n'
    #[wasm_bindgen(js_name = pushPcm)]
    pub fn push_pcm(&mut self, samples: &[i16]) -> Result<String, JsValue> {
        let mono = cassetteflow_core::pcm::stereo_to_mono(samples);
        let bytes = self.inner.push_samples(&mono).map_err(js_err)?;
        Ok(self.lines.push(&bytes).join("\n"))
    }

    /// Flush buffered audio at the end of a recording
    pub fn finish(&mut self) -> Result<String, JsValue> {
        let bytes = self.inner.finish().map_err(js_err)?;
        Ok(self.lines.push(&bytes).join("\n"))
    }

    #[wasm_bindgen(getter, js_name = hasCarrier)]
    pub fn has_carrier(&self) -> bool {
        self.inner.is_carrier()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cassetteflow_core::ProfileOverrides;

    #[test]
    fn test_overrides_default_is_tape_profile() {
        assert_eq!(modem(None, None).overrides, ProfileOverrides::default());
        assert_eq!(modem(Some("300".into()), Some(44100)).sample_rate, 44100);
    }
}
