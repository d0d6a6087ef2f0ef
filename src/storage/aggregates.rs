use crate::data::Value;
use crate::query::plan::AggFunction;

/// Running state of one aggregate call within one group
pub trait Accumulator: Send + Sync {
    /// Add a value to the accumulator. Nulls are ignored.
    fn accumulate(&mut self, value: &Value);

    /// Get the final result; null when no value was accumulated
    fn result(&self) -> Value;
}

/// SUM(column). Stays integral while every input is an integer.
#[derive(Debug, Clone)]
pub struct SumAccumulator {
    int_sum: i64,
    float_sum: f64,
    integral: bool,
    has_value: bool,
}

impl SumAccumulator {
    pub fn new() -> Self {
        Self {
            int_sum: 0,
            float_sum: 0.0,
            integral: true,
            has_value: false,
        }
    }
}

impl Default for SumAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl Accumulator for SumAccumulator {
    fn accumulate(&mut self, value: &Value) {
        match value {
            Value::Int64(v) if self.integral => match self.int_sum.checked_add(*v) {
                Some(sum) => self.int_sum = sum,
                None => {
                    self.integral = false;
                    self.float_sum = self.int_sum as f64 + *v as f64;
                }
            },
            Value::Int64(_) | Value::Float64(_) => {
                if self.integral {
                    self.integral = false;
                    self.float_sum = self.int_sum as f64;
                }
                self.float_sum += value.as_f64().unwrap_or_default();
            }
            _ => return,
        }
        self.has_value = true;
    }

    fn result(&self) -> Value {
        match (self.has_value, self.integral) {
            (false, _) => Value::Null,
            (true, true) => Value::Int64(self.int_sum),
            (true, false) => Value::Float64(self.float_sum),
        }
    }
}

/// MIN(column)
#[derive(Debug, Clone, Default)]
pub struct MinAccumulator {
    min: Option<Value>,
}

impl Accumulator for MinAccumulator {
    fn accumulate(&mut self, value: &Value) {
        if value.is_null() {
            return;
        }
        match &self.min {
            Some(current) if current <= value => {}
            _ => self.min = Some(value.clone()),
        }
    }

    fn result(&self) -> Value {
        self.min.clone().unwrap_or(Value::Null)
    }
}

/// MAX(column)
#[derive(Debug, Clone, Default)]
pub struct MaxAccumulator {
    max: Option<Value>,
}

impl Accumulator for MaxAccumulator {
    fn accumulate(&mut self, value: &Value) {
        if value.is_null() {
            return;
        }
        match &self.max {
            Some(current) if current >= value => {}
            _ => self.max = Some(value.clone()),
        }
    }

    fn result(&self) -> Value {
        self.max.clone().unwrap_or(Value::Null)
    }
}

/// Create an accumulator for an aggregate function
pub fn create_accumulator(function: AggFunction) -> Box<dyn Accumulator> {
    match function {
        AggFunction::Sum => Box::new(SumAccumulator::new()),
        AggFunction::Min => Box::new(MinAccumulator::default()),
        AggFunction::Max => Box::new(MaxAccumulator::default()),
    }
}
