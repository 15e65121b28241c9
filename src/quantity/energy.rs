quantity!(KilowattHours, "kWh", 2);
