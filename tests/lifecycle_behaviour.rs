//! Behavioural scenarios for the machine lifecycle driver.

mod lifecycle;
