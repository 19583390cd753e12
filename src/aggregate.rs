//! Incremental reducers used by client-streaming and bidirectional handlers.

use crate::ProtocolError;

/// Running state folded over the messages of one stream.
///
/// Bidirectional handlers emit what [`Aggregate::update`] returns after each
/// message, client-streaming handlers emit [`Aggregate::finish`] once the
/// stream ended.
pub trait Aggregate {
    type Input;
    type Output;

    /// Folds one message into the state and returns the value worth
    /// emitting after this mutation, if any.
    fn update(&mut self, input: Self::Input) -> Option<Self::Output>;

    /// Consumes the state and produces the terminal value.
    fn finish(self) -> Result<Self::Output, ProtocolError>;
}

/// Arithmetic mean of every number received.
#[derive(Debug, Default)]
pub struct Average {
    sum: i64,
    count: u64,
}

impl Average {
    fn current(&self) -> Option<f64> {
        match self.count {
            0 => None,
            count => Some(self.sum as f64 / count as f64),
        }
    }
}

impl Aggregate for Average {
    type Input = i32;
    type Output = f64;

    fn update(&mut self, number: i32) -> Option<f64> {
        self.sum += i64::from(number);
        self.count += 1;
        self.current()
    }

    fn finish(self) -> Result<f64, ProtocolError> {
        self.current().ok_or_else(|| {
            ProtocolError::invalid_argument("cannot compute the average of zero numbers")
        })
    }
}

/// Largest number seen so far. Only strictly greater numbers are emitted.
#[derive(Debug, Default)]
pub struct RunningMaximum {
    current_max: Option<i64>,
}

impl Aggregate for RunningMaximum {
    type Input = i64;
    type Output = i64;

    fn update(&mut self, number: i64) -> Option<i64> {
        match self.current_max {
            Some(max) if number <= max => None,
            _ => {
                self.current_max = Some(number);
                self.current_max
            }
        }
    }

    fn finish(self) -> Result<i64, ProtocolError> {
        self.current_max
            .ok_or_else(|| ProtocolError::invalid_argument("no numbers were received"))
    }
}

/// Text built by appending one fragment per message.
#[derive(Debug, Default)]
pub struct Concatenation {
    accumulated_text: String,
}

impl Aggregate for Concatenation {
    type Input = String;
    type Output = String;

    /// Appends `fragment`. Partial text is never emitted, only the
    /// [`finish`](Aggregate::finish)ed whole.
    fn update(&mut self, fragment: String) -> Option<String> {
        self.accumulated_text.push_str(&fragment);
        None
    }

    fn finish(self) -> Result<String, ProtocolError> {
        Ok(self.accumulated_text)
    }
}

/// Result of a bounded run of trial divisions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FactorStep {
    Factor(u64),
    /// The step budget ran out before the next factor was found.
    Unfinished,
    Exhausted,
}

/// Prime factors of a number in non-decreasing order, found by trial
/// division starting at 2.
#[derive(Debug)]
pub struct PrimeFactors {
    remaining_value: u64,
    divisor: u64,
}

impl PrimeFactors {
    pub fn new(number: i64) -> Result<Self, ProtocolError> {
        match u64::try_from(number) {
            Ok(remaining_value) if remaining_value >= 1 => Ok(Self {
                remaining_value,
                divisor: 2,
            }),
            _ => Err(ProtocolError::invalid_argument(format!(
                "cannot decompose {number}, the number must be at least 1"
            ))),
        }
    }

    /// Tries at most `max_divisions` divisors looking for the next factor,
    /// so callers can yield between runs on large primes.
    pub fn next_within(&mut self, max_divisions: u64) -> FactorStep {
        for _ in 0..max_divisions {
            if self.remaining_value <= 1 {
                return FactorStep::Exhausted;
            }
            // once divisor² exceeds what is left, the rest is itself prime
            if self.divisor > self.remaining_value / self.divisor {
                self.divisor = self.remaining_value;
            }
            if self.remaining_value % self.divisor == 0 {
                self.remaining_value /= self.divisor;
                return FactorStep::Factor(self.divisor);
            }
            self.divisor += 1;
        }
        match self.remaining_value {
            0 | 1 => FactorStep::Exhausted,
            _ => FactorStep::Unfinished,
        }
    }
}

impl Iterator for PrimeFactors {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        loop {
            match self.next_within(u64::MAX) {
                FactorStep::Factor(factor) => return Some(factor),
                FactorStep::Exhausted => return None,
                FactorStep::Unfinished => (),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::ProtocolErrorType;

    use super::*;

    fn is_prime(n: u64) -> bool {
        n >= 2 && (2..n).take_while(|d| d * d <= n).all(|d| n % d != 0)
    }

    #[test]
    fn decomposes_120() {
        let factors: Vec<u64> = PrimeFactors::new(120).unwrap().collect();
        assert_eq!(factors, vec![2, 2, 2, 3, 5]);
    }

    #[test]
    fn factors_multiply_back_in_order() {
        for n in (1..=2000).chain([1_000_003, 600_851_475_143]) {
            let factors: Vec<u64> = PrimeFactors::new(n).unwrap().collect();
            assert_eq!(factors.iter().product::<u64>(), n as u64, "n = {n}");
            assert!(factors.windows(2).all(|w| w[0] <= w[1]), "n = {n}");
            if let Some(smallest) = factors.first() {
                assert!(is_prime(*smallest), "n = {n}");
            }
        }
    }

    #[test]
    fn one_has_no_factors() {
        assert_eq!(PrimeFactors::new(1).unwrap().count(), 0);
    }

    #[test]
    fn rejects_numbers_below_one() {
        for n in [0, -7] {
            let error = PrimeFactors::new(n).unwrap_err();
            assert_eq!(error.error_type, ProtocolErrorType::InvalidArgument);
        }
    }

    #[test]
    fn average_of_stream() {
        let mut average = Average::default();
        for number in [3, 5, 9, 54, 23] {
            average.update(number);
        }
        assert!((average.finish().unwrap() - 18.8).abs() < 1e-9);
    }

    #[test]
    fn average_of_nothing_is_invalid() {
        let error = Average::default().finish().unwrap_err();
        assert_eq!(error.error_type, ProtocolErrorType::InvalidArgument);
    }

    #[test]
    fn maximum_emits_only_increases() {
        let mut maximum = RunningMaximum::default();
        let emitted: Vec<i64> = [4, 7, 2, 19, 4, 6, 32]
            .into_iter()
            .filter_map(|n| maximum.update(n))
            .collect();
        assert_eq!(emitted, vec![4, 7, 19, 32]);
        assert_eq!(maximum.finish().unwrap(), 32);
    }

    #[test]
    fn maximum_starts_below_negative_inputs() {
        let mut maximum = RunningMaximum::default();
        assert_eq!(maximum.update(-10), Some(-10));
        assert_eq!(maximum.update(-10), None);
        assert_eq!(maximum.update(-3), Some(-3));
    }

    #[test]
    fn concatenation_appends_fragments() {
        let mut text = Concatenation::default();
        assert_eq!(text.update("Hello Deepak! ".to_string()), None);
        assert_eq!(text.update("Hello John! ".to_string()), None);
        assert_eq!(text.finish().unwrap(), "Hello Deepak! Hello John! ");
    }

    #[test]
    fn concatenation_of_many_fragments() {
        let mut text = Concatenation::default();
        for _ in 0..20_000 {
            assert!(text.update("Hello Deepak! ".to_string()).is_none());
        }
        assert_eq!(text.finish().unwrap().len(), 20_000 * "Hello Deepak! ".len());
    }

    #[test]
    fn bounded_steps_stop_on_large_primes() {
        let mut factors = PrimeFactors::new(999_999_999_999_999_989).unwrap();
        assert_eq!(factors.next_within(1_000), FactorStep::Unfinished);
        assert_eq!(factors.next_within(1_000), FactorStep::Unfinished);

        let mut factors = PrimeFactors::new(45).unwrap();
        assert_eq!(factors.next_within(1), FactorStep::Unfinished);
        assert_eq!(factors.next_within(1), FactorStep::Factor(3));
        assert_eq!(factors.next_within(1), FactorStep::Factor(3));
        assert_eq!(factors.next_within(1), FactorStep::Factor(5));
        assert_eq!(factors.next_within(1), FactorStep::Exhausted);
    }
}
