//! Picovoice Porcupine backend.

use porcupine::{BuiltinKeywords, Porcupine, PorcupineBuilder};

use super::{Detector, DetectorConfig, DetectorError, DetectorFactory, KeywordSource};

pub struct PorcupineFactory;

impl DetectorFactory for PorcupineFactory {
    fn create(&self, config: &DetectorConfig) -> Result<Box<dyn Detector>, DetectorError> {
        let sensitivities = config.resolved_sensitivities();

        let porcupine = match &config.keywords {
            KeywordSource::Builtin(names) => {
                let keywords = names
                    .iter()
                    .map(|name| builtin_keyword(name))
                    .collect::<Result<Vec<_>, _>>()?;
                PorcupineBuilder::new_with_keywords(config.access_key.clone(), &keywords)
                    .sensitivities(&sensitivities)
                    .init()
            }
            KeywordSource::ModelPaths(paths) => {
                PorcupineBuilder::new_with_keyword_paths(config.access_key.clone(), paths.as_slice())
                    .sensitivities(&sensitivities)
                    .init()
            }
        }
        .map_err(|e| DetectorError::Init(e.to_string()))?;

        Ok(Box::new(PorcupineDetector {
            frame_length: porcupine.frame_length() as usize,
            sample_rate: porcupine.sample_rate(),
            porcupine: Some(porcupine),
        }))
    }

    fn name(&self) -> &'static str {
        "porcupine"
    }
}

struct PorcupineDetector {
    porcupine: Option<Porcupine>,
    frame_length: usize,
    sample_rate: u32,
}

impl Detector for PorcupineDetector {
    fn frame_length(&self) -> usize {
        self.frame_length
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn process(&mut self, frame: &[i16]) -> Result<Option<usize>, DetectorError> {
        let porcupine = self.porcupine.as_ref().ok_or(DetectorError::Released)?;
        let index = porcupine
            .process(frame)
            .map_err(|e| DetectorError::Process(e.to_string()))?;
        // Negative means no keyword in this frame.
        Ok(usize::try_from(index).ok())
    }

    fn release(&mut self) -> Result<(), DetectorError> {
        // The native handle is freed when `Porcupine` drops.
        self.porcupine.take();
        Ok(())
    }
}

/// Map a lower-cased built-in keyword name to the backend enum.
fn builtin_keyword(name: &str) -> Result<BuiltinKeywords, DetectorError> {
    let keyword = match name {
        "alexa" => BuiltinKeywords::Alexa,
        "americano" => BuiltinKeywords::Americano,
        "blueberry" => BuiltinKeywords::Blueberry,
        "bumblebee" => BuiltinKeywords::Bumblebee,
        "computer" => BuiltinKeywords::Computer,
        "grapefruit" => BuiltinKeywords::Grapefruit,
        "grasshopper" => BuiltinKeywords::Grasshopper,
        "hey google" => BuiltinKeywords::HeyGoogle,
        "hey siri" => BuiltinKeywords::HeySiri,
        "jarvis" => BuiltinKeywords::Jarvis,
        "ok google" => BuiltinKeywords::OkGoogle,
        "picovoice" => BuiltinKeywords::Picovoice,
        "porcupine" => BuiltinKeywords::Porcupine,
        "terminator" => BuiltinKeywords::Terminator,
        other => {
            return Err(DetectorError::Init(format!(
                "unknown built-in keyword '{}'",
                other
            )))
        }
    };
    Ok(keyword)
}
