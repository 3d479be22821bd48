use crate::events::{AdEvent, Emitter, EventEmitter, Value};
use crate::surface::{MediaElement, native};
use std::sync::{Arc, Mutex, Weak};

const QUARTILES: [AdEvent; 3] = [
    AdEvent::AdVideoFirstQuartile,
    AdEvent::AdVideoMidpoint,
    AdEvent::AdVideoThirdQuartile,
];

/// Quartile events crossed when playback reaches `position` of `duration`,
/// given how many have been reported already.
pub(crate) fn quartiles_reached(reported: usize, position: f64, duration: f64) -> &'static [AdEvent] {
    if !(duration > 0.0) {
        return &[];
    }
    let reached = QUARTILES
        .iter()
        .enumerate()
        .take_while(|(index, _)| position >= duration * (*index as f64 + 1.0) / 4.0)
        .count();
    if reached > reported {
        &QUARTILES[reported..reached]
    } else {
        &[]
    }
}

#[derive(Default)]
struct Progress {
    started: bool,
    quartiles: usize,
    completed: bool,
}

/// Turns a media element's playback notifications into VPAID progress
/// events: AdVideoStart, the quartiles, AdVideoComplete, AdTimeUpdate and
/// AdRemainingTimeChange.
pub struct MediaTracker {
    events: EventEmitter,
}

impl Emitter for MediaTracker {
    fn events(&self) -> &EventEmitter {
        &self.events
    }
}

impl MediaTracker {
    pub fn new(media: &Arc<dyn MediaElement>) -> Self {
        let events = EventEmitter::new();
        let progress = Arc::new(Mutex::new(Progress::default()));
        let source = media.events();

        {
            let events = events.clone();
            let progress = progress.clone();
            source.on(native::PLAYING, move |_| {
                let first = progress
                    .lock()
                    .map(|mut p| !std::mem::replace(&mut p.started, true))
                    .unwrap_or(false);
                if first {
                    events.emit(AdEvent::AdVideoStart, &[]);
                }
            });
        }

        {
            let events = events.clone();
            let progress = progress.clone();
            let media: Weak<dyn MediaElement> = Arc::downgrade(media);
            source.on(native::TIMEUPDATE, move |_| {
                let Some(media) = media.upgrade() else {
                    return;
                };
                let (position, duration) = (media.current_time(), media.duration());

                let crossed: &[AdEvent] = match progress.lock() {
                    Ok(mut p) => {
                        let crossed = quartiles_reached(p.quartiles, position, duration);
                        p.quartiles += crossed.len();
                        crossed
                    }
                    Err(_) => &[],
                };

                events.emit(AdEvent::AdTimeUpdate, &[Value::from(position)]);
                events.emit(
                    AdEvent::AdRemainingTimeChange,
                    &[Value::from((duration - position).max(0.0))],
                );
                for quartile in crossed {
                    events.emit(quartile, &[]);
                }
            });
        }

        {
            let events = events.clone();
            source.on(native::ENDED, move |_| {
                let first = progress
                    .lock()
                    .map(|mut p| !std::mem::replace(&mut p.completed, true))
                    .unwrap_or(false);
                if first {
                    events.emit(AdEvent::AdVideoComplete, &[]);
                }
            });
        }

        Self { events }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quartiles_are_reported_in_order_and_once() {
        assert!(quartiles_reached(0, 1.0, 20.0).is_empty());
        assert_eq!(quartiles_reached(0, 5.0, 20.0), [AdEvent::AdVideoFirstQuartile]);
        assert_eq!(
            quartiles_reached(1, 16.0, 20.0),
            [AdEvent::AdVideoMidpoint, AdEvent::AdVideoThirdQuartile]
        );
        assert!(quartiles_reached(3, 20.0, 20.0).is_empty());
    }

    #[test]
    fn jumping_to_the_end_reports_every_quartile() {
        assert_eq!(quartiles_reached(0, 30.0, 30.0), QUARTILES);
    }

    #[test]
    fn unknown_duration_reports_nothing() {
        assert!(quartiles_reached(0, 10.0, 0.0).is_empty());
        assert!(quartiles_reached(0, 10.0, f64::NAN).is_empty());
    }
}
